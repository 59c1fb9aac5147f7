// ==========================================
// 高校开放数据入库系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope),缺省值在代码中
// ==========================================

use crate::config::ingest_config_trait::IngestConfigReader;
use crate::db::{configure_sqlite_connection, ensure_schema, open_sqlite_connection};
use crate::domain::records::Institution;
use crate::domain::types::{EntityType, SourceEncoding};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::locale_normalizer::LocaleNormalizer;
use crate::repository::error::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::warn;

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        ensure_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager（再次应用统一 PRAGMA,幂等）
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let guard = conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            configure_sqlite_connection(&guard)?;
            ensure_schema(&guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    fn get_config_value(&self, key: &str) -> RepositoryResult<Option<String>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;

        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 写入 global scope 的配置值（UPSERT）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> RepositoryResult<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;

        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value, updated_at) VALUES ('global', ?1, ?2, datetime('now'))
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    /// 从 config_kv 表读取配置值,带默认值
    fn get_config_or_default(&self, key: &str, default: &str) -> RepositoryResult<String> {
        Ok(self
            .get_config_value(key)?
            .unwrap_or_else(|| default.to_string()))
    }

    /// 读取并解析; 格式错误时告警并使用默认值
    fn parse_or_default<T>(&self, key: &str, default: T) -> RepositoryResult<T>
    where
        T: FromStr + Display + Copy,
    {
        let Some(raw) = self.get_config_value(key)? else {
            return Ok(default);
        };

        Ok(raw.trim().parse::<T>().unwrap_or_else(|_| {
            warn!(
                config_key = key,
                raw_value = %raw,
                default = %default,
                "配置值格式错误,使用默认值"
            );
            default
        }))
    }
}

// ==========================================
// IngestConfigReader Trait 实现
// ==========================================
#[async_trait]
impl IngestConfigReader for ConfigManager {
    async fn get_storage_retry_attempts(&self) -> ImportResult<u32> {
        Ok(self.parse_or_default(
            config_keys::STORAGE_RETRY_ATTEMPTS,
            defaults::STORAGE_RETRY_ATTEMPTS,
        )?)
    }

    async fn get_storage_retry_backoff_ms(&self) -> ImportResult<u64> {
        Ok(self.parse_or_default(
            config_keys::STORAGE_RETRY_BACKOFF_MS,
            defaults::STORAGE_RETRY_BACKOFF_MS,
        )?)
    }

    async fn get_storage_timeout_ms(&self) -> ImportResult<u64> {
        Ok(self.parse_or_default(config_keys::STORAGE_TIMEOUT_MS, defaults::STORAGE_TIMEOUT_MS)?)
    }

    async fn get_max_parallel_files(&self) -> ImportResult<usize> {
        Ok(self.parse_or_default(config_keys::MAX_PARALLEL_FILES, defaults::MAX_PARALLEL_FILES)?)
    }

    async fn get_institution_code(&self) -> ImportResult<String> {
        Ok(self.get_config_or_default(config_keys::INSTITUTION_CODE, defaults::INSTITUTION_CODE)?)
    }

    async fn get_institution_code_width(&self) -> ImportResult<usize> {
        Ok(self.parse_or_default(
            config_keys::INSTITUTION_CODE_WIDTH,
            defaults::INSTITUTION_CODE_WIDTH,
        )?)
    }

    async fn get_institution_tax_id(&self) -> ImportResult<String> {
        Ok(self.get_config_or_default(
            config_keys::INSTITUTION_TAX_ID,
            defaults::INSTITUTION_TAX_ID,
        )?)
    }

    async fn get_institution_name(&self) -> ImportResult<String> {
        Ok(self.get_config_or_default(config_keys::INSTITUTION_NAME, defaults::INSTITUTION_NAME)?)
    }

    async fn get_institution_short_name(&self) -> ImportResult<Option<String>> {
        let value = self.get_config_or_default(
            config_keys::INSTITUTION_SHORT_NAME,
            defaults::INSTITUTION_SHORT_NAME,
        )?;
        let trimmed = value.trim();
        Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
    }

    async fn get_encoding(&self, entity: EntityType) -> ImportResult<SourceEncoding> {
        let key = config_keys::encoding_key(entity);
        match self.get_config_value(&key)? {
            None => Ok(entity.default_encoding()),
            Some(raw) => SourceEncoding::from_str(&raw).ok_or_else(|| ImportError::ConfigValueError {
                key,
                value: raw,
                message: "仅支持 utf-8 / latin-1".to_string(),
            }),
        }
    }
}

// ==========================================
// IngestSettings - 一次运行所用的全部配置
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct IngestSettings {
    pub storage_retry_attempts: u32,
    pub storage_retry_backoff_ms: u64,
    pub storage_timeout_ms: u64,
    pub max_parallel_files: usize,
    pub institution_code_width: usize,
    pub institution: Institution, // 编码已补零
    pub encodings: HashMap<EntityType, SourceEncoding>,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            storage_retry_attempts: defaults::STORAGE_RETRY_ATTEMPTS,
            storage_retry_backoff_ms: defaults::STORAGE_RETRY_BACKOFF_MS,
            storage_timeout_ms: defaults::STORAGE_TIMEOUT_MS,
            max_parallel_files: defaults::MAX_PARALLEL_FILES,
            institution_code_width: defaults::INSTITUTION_CODE_WIDTH,
            institution: Institution {
                cod_universidad: format!(
                    "{:0>width$}",
                    defaults::INSTITUTION_CODE,
                    width = defaults::INSTITUTION_CODE_WIDTH
                ),
                nifoc: defaults::INSTITUTION_TAX_ID.to_string(),
                des_universidad: defaults::INSTITUTION_NAME.to_string(),
                nombre_corto: Some(defaults::INSTITUTION_SHORT_NAME.to_string()),
            },
            encodings: EntityType::LOAD_ORDER
                .into_iter()
                .map(|e| (e, e.default_encoding()))
                .collect(),
        }
    }
}

impl IngestSettings {
    /// 一次性解析全部配置并校验
    pub async fn load(reader: &dyn IngestConfigReader) -> ImportResult<Self> {
        let max_parallel_files = reader.get_max_parallel_files().await?;
        if max_parallel_files == 0 {
            return Err(ImportError::ConfigValueError {
                key: config_keys::MAX_PARALLEL_FILES.to_string(),
                value: "0".to_string(),
                message: "必须大于 0".to_string(),
            });
        }

        let storage_retry_attempts = reader.get_storage_retry_attempts().await?.max(1);

        let width = reader.get_institution_code_width().await?;
        let raw_code = reader.get_institution_code().await?;
        let cod_universidad = LocaleNormalizer
            .pad_code(raw_code.trim(), width)
            .map_err(|e| ImportError::ConfigValueError {
                key: config_keys::INSTITUTION_CODE.to_string(),
                value: raw_code.clone(),
                message: e.to_string(),
            })?;

        let mut encodings = HashMap::new();
        for entity in EntityType::LOAD_ORDER {
            encodings.insert(entity, reader.get_encoding(entity).await?);
        }

        Ok(Self {
            storage_retry_attempts,
            storage_retry_backoff_ms: reader.get_storage_retry_backoff_ms().await?,
            storage_timeout_ms: reader.get_storage_timeout_ms().await?,
            max_parallel_files,
            institution_code_width: width,
            institution: Institution {
                cod_universidad,
                nifoc: reader.get_institution_tax_id().await?.trim().to_string(),
                des_universidad: reader.get_institution_name().await?,
                nombre_corto: reader.get_institution_short_name().await?,
            },
            encodings,
        })
    }

    pub fn encoding_for(&self, entity: EntityType) -> SourceEncoding {
        self.encodings
            .get(&entity)
            .copied()
            .unwrap_or_else(|| entity.default_encoding())
    }
}

// ==========================================
// 默认值
// ==========================================
pub mod defaults {
    pub const STORAGE_RETRY_ATTEMPTS: u32 = 3;
    pub const STORAGE_RETRY_BACKOFF_MS: u64 = 200;
    pub const STORAGE_TIMEOUT_MS: u64 = 30_000;
    pub const MAX_PARALLEL_FILES: usize = 4;
    pub const INSTITUTION_CODE: &str = "23";
    pub const INSTITUTION_CODE_WIDTH: usize = 3;
    pub const INSTITUTION_TAX_ID: &str = "Q2818013A";
    pub const INSTITUTION_NAME: &str = "Universidad Autónoma de Madrid";
    pub const INSTITUTION_SHORT_NAME: &str = "UAM";
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    use crate::domain::types::EntityType;

    // 存储交接
    pub const STORAGE_RETRY_ATTEMPTS: &str = "storage_retry_attempts";
    pub const STORAGE_RETRY_BACKOFF_MS: &str = "storage_retry_backoff_ms";
    pub const STORAGE_TIMEOUT_MS: &str = "storage_timeout_ms";

    // 并发
    pub const MAX_PARALLEL_FILES: &str = "max_parallel_files";

    // 大学种子数据
    pub const INSTITUTION_CODE: &str = "institution_code";
    pub const INSTITUTION_CODE_WIDTH: &str = "institution_code_width";
    pub const INSTITUTION_TAX_ID: &str = "institution_tax_id";
    pub const INSTITUTION_NAME: &str = "institution_name";
    pub const INSTITUTION_SHORT_NAME: &str = "institution_short_name";

    /// 源文件编码: encoding.<entity>,如 encoding.grant_call
    pub fn encoding_key(entity: EntityType) -> String {
        format!("encoding.{}", entity.to_db_str().to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn manager() -> (NamedTempFile, ConfigManager) {
        let temp_file = NamedTempFile::new().unwrap();
        let manager = ConfigManager::new(temp_file.path().to_str().unwrap()).unwrap();
        (temp_file, manager)
    }

    #[tokio::test]
    async fn test_defaults_without_overrides() {
        let (_f, manager) = manager();
        let settings = IngestSettings::load(&manager).await.unwrap();
        assert_eq!(settings, IngestSettings::default());
        assert_eq!(settings.institution.cod_universidad, "023");
        assert_eq!(
            settings.encoding_for(EntityType::ProcurementContract),
            SourceEncoding::Latin1
        );
    }

    #[tokio::test]
    async fn test_overrides_from_config_kv() {
        let (_f, manager) = manager();
        manager.set_global_config_value("max_parallel_files", "2").unwrap();
        manager.set_global_config_value("institution_code", "7").unwrap();
        manager
            .set_global_config_value("encoding.budget_expense", "latin-1")
            .unwrap();

        let settings = IngestSettings::load(&manager).await.unwrap();
        assert_eq!(settings.max_parallel_files, 2);
        assert_eq!(settings.institution.cod_universidad, "007");
        assert_eq!(
            settings.encoding_for(EntityType::BudgetExpense),
            SourceEncoding::Latin1
        );
    }

    #[tokio::test]
    async fn test_malformed_number_falls_back_to_default() {
        let (_f, manager) = manager();
        manager
            .set_global_config_value("storage_retry_attempts", "tres")
            .unwrap();
        assert_eq!(manager.get_storage_retry_attempts().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_invalid_values_rejected() {
        let (_f, manager) = manager();
        manager.set_global_config_value("max_parallel_files", "0").unwrap();
        assert!(matches!(
            IngestSettings::load(&manager).await,
            Err(ImportError::ConfigValueError { .. })
        ));

        manager.set_global_config_value("max_parallel_files", "4").unwrap();
        manager.set_global_config_value("encoding.grant", "cp1252").unwrap();
        assert!(matches!(
            IngestSettings::load(&manager).await,
            Err(ImportError::ConfigValueError { .. })
        ));
    }
}
