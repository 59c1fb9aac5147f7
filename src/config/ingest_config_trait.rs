// ==========================================
// 高校开放数据入库系统 - 入库配置读取 Trait
// ==========================================
// 职责: 定义导入编排所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::domain::types::{EntityType, SourceEncoding};
use crate::importer::error::ImportResult;
use async_trait::async_trait;

// ==========================================
// IngestConfigReader Trait
// ==========================================
// 用途: 导入编排所需的配置读取接口
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait IngestConfigReader: Send + Sync {
    // ===== 存储交接 =====

    /// 存储写入最大尝试次数（默认 3）
    async fn get_storage_retry_attempts(&self) -> ImportResult<u32>;

    /// 重试退避基数,毫秒（默认 200,按 2^n 递增）
    async fn get_storage_retry_backoff_ms(&self) -> ImportResult<u64>;

    /// 单次存储操作超时,毫秒（默认 30000）
    async fn get_storage_timeout_ms(&self) -> ImportResult<u64>;

    // ===== 并发 =====

    /// 同一实体类型并行准备的文件数上限（默认 4）
    async fn get_max_parallel_files(&self) -> ImportResult<usize>;

    // ===== 大学种子数据 =====

    /// 大学编码（默认 "23",写入前左补零）
    async fn get_institution_code(&self) -> ImportResult<String>;

    /// 大学编码位数（默认 3）
    async fn get_institution_code_width(&self) -> ImportResult<usize>;

    /// 大学税号（默认 Q2818013A）
    async fn get_institution_tax_id(&self) -> ImportResult<String>;

    async fn get_institution_name(&self) -> ImportResult<String>;

    async fn get_institution_short_name(&self) -> ImportResult<Option<String>>;

    // ===== 源文件编码 =====

    /// 实体类型的首选编码（默认按实体类型区分）
    async fn get_encoding(&self, entity: EntityType) -> ImportResult<SourceEncoding>;
}
