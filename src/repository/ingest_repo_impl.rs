// ==========================================
// 高校开放数据入库系统 - 入库 Repository 实现
// ==========================================
// 职责: 实现入库数据访问（使用 rusqlite）
// 红线: Repository 不含业务规则,只做数据 CRUD
// 并发: 单连接 Arc<Mutex<Connection>>,写入串行化
// ==========================================

use crate::db::{configure_sqlite_connection, ensure_schema, open_sqlite_connection};
use crate::domain::records::{
    BudgetLine, EntityRecord, Grant, GrantCall, Institution, ProcurementContract, UniqueKey,
};
use crate::domain::types::{EntityType, KeyDomain};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::ingest_repo::IngestRepository;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, Statement, Transaction};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn date_text(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format("%Y-%m-%d").to_string())
}

fn timestamp_text(ts: Option<NaiveDateTime>) -> Option<String> {
    ts.map(|t| t.format(TIMESTAMP_FORMAT).to_string())
}

// ==========================================
// IngestRepositoryImpl
// ==========================================
pub struct IngestRepositoryImpl {
    conn: Arc<Mutex<Connection>>,
}

impl IngestRepositoryImpl {
    /// 打开数据库并确保表结构存在
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

    /// 从已有连接创建（再次应用统一 PRAGMA,幂等）
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

    /// 共享连接（供配置读取复用）
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    /// 按存储超时配置 busy_timeout
    ///
    /// rusqlite 调用在 async 方法内同步执行,外层 tokio 超时无法打断,
    /// 锁等待的上限由此处决定
    pub fn set_busy_timeout(&self, timeout_ms: u64) -> RepositoryResult<()> {
        let conn = self.lock()?;
        conn.busy_timeout(Duration::from_millis(timeout_ms))?;
        Ok(())
    }

    fn lock(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn insert_sql(entity: EntityType) -> RepositoryResult<String> {
        let sql = match entity {
            EntityType::BudgetExpense | EntityType::BudgetIncome => format!(
                r#"
                INSERT INTO {} (
                    cod_universidad, anio, cod_partida, des_capitulo, des_articulo,
                    des_concepto, credito_inicial, modificaciones, credito_total
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
                entity.table_name()
            ),
            EntityType::GrantCall => r#"
                INSERT INTO convocatoria_ayuda (
                    cod_convocatoria, cod_universidad, nombre_convocatoria,
                    fecha_inicio_solicitudes, fecha_fin_solicitudes, des_categoria
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#
            .to_string(),
            EntityType::Grant => r#"
                INSERT INTO ayuda (
                    cod_universidad, cod_convocatoria_ayuda, cuantia_total, anio, fecha_concesion
                ) VALUES (?1, ?2, ?3, ?4, ?5)
                "#
            .to_string(),
            EntityType::ProcurementContract => r#"
                INSERT INTO licitacion (
                    identificador, lote, nif_oc, primera_publicacion, presupuesto_base,
                    importe_adjudicacion, resultado, identificador_adjudicatario,
                    adjudicatario, objeto, link_licitacion, financiacion_europea
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                "#
            .to_string(),
            EntityType::Institution => {
                return Err(RepositoryError::InternalError(
                    "大学记录只能通过种子写入".to_string(),
                ))
            }
        };
        Ok(sql)
    }

    /// 在事务中批量写入
    fn insert_records_tx(
        tx: &Transaction,
        entity: EntityType,
        records: &[EntityRecord],
    ) -> RepositoryResult<usize> {
        let sql = Self::insert_sql(entity)?;
        let mut stmt = tx.prepare(&sql)?;

        let mut count = 0;
        for record in records {
            if record.entity_type() != entity {
                return Err(RepositoryError::InternalError(format!(
                    "记录类型 {} 与目标表 {} 不一致",
                    record.entity_type(),
                    entity
                )));
            }
            match record {
                EntityRecord::BudgetExpense(line) | EntityRecord::BudgetIncome(line) => {
                    Self::execute_budget(&mut stmt, line)?
                }
                EntityRecord::GrantCall(call) => Self::execute_grant_call(&mut stmt, call)?,
                EntityRecord::Grant(grant) => Self::execute_grant(&mut stmt, grant)?,
                EntityRecord::ProcurementContract(contract) => {
                    Self::execute_contract(&mut stmt, contract)?
                }
            }
            count += 1;
        }

        Ok(count)
    }

    fn execute_budget(stmt: &mut Statement, line: &BudgetLine) -> RepositoryResult<()> {
        stmt.execute(params![
            line.cod_universidad,
            line.anio,
            line.cod_partida,
            line.des_capitulo,
            line.des_articulo,
            line.des_concepto,
            line.credito_inicial.to_string(),
            line.modificaciones.to_string(),
            line.credito_total.to_string(),
        ])?;
        Ok(())
    }

    fn execute_grant_call(stmt: &mut Statement, call: &GrantCall) -> RepositoryResult<()> {
        stmt.execute(params![
            call.cod_convocatoria,
            call.cod_universidad,
            call.nombre_convocatoria,
            date_text(call.fecha_inicio_solicitudes),
            date_text(call.fecha_fin_solicitudes),
            call.des_categoria,
        ])?;
        Ok(())
    }

    fn execute_grant(stmt: &mut Statement, grant: &Grant) -> RepositoryResult<()> {
        stmt.execute(params![
            grant.cod_universidad,
            grant.cod_convocatoria_ayuda,
            grant.cuantia_total.map(|d| d.to_string()),
            grant.anio,
            date_text(grant.fecha_concesion),
        ])?;
        Ok(())
    }

    fn execute_contract(
        stmt: &mut Statement,
        contract: &ProcurementContract,
    ) -> RepositoryResult<()> {
        stmt.execute(params![
            contract.identificador,
            contract.lote,
            contract.nif_oc,
            timestamp_text(contract.primera_publicacion),
            contract.presupuesto_base.map(|d| d.to_string()),
            contract.importe_adjudicacion.map(|d| d.to_string()),
            contract.resultado,
            contract.identificador_adjudicatario,
            contract.adjudicatario,
            contract.objeto,
            contract.link_licitacion,
            contract.financiacion_europea,
        ])?;
        Ok(())
    }

    fn query_strings(conn: &Connection, sql: &str) -> RepositoryResult<Vec<Vec<String>>> {
        let mut stmt = conn.prepare(sql)?;
        let width = stmt.column_count();
        let rows = stmt.query_map([], |row| {
            (0..width)
                .map(|i| row.get::<_, String>(i))
                .collect::<rusqlite::Result<Vec<String>>>()
        })?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }
}

#[async_trait]
impl IngestRepository for IngestRepositoryImpl {
    async fn seed_institution(&self, institution: &Institution) -> RepositoryResult<()> {
        let conn = self.lock()?;
        // 已存在则保持不变
        let inserted = conn.execute(
            r#"
            INSERT OR IGNORE INTO universidad (cod_universidad, nifoc, des_universidad, nombre_corto)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                institution.cod_universidad,
                institution.nifoc,
                institution.des_universidad,
                institution.nombre_corto,
            ],
        )?;
        debug!(
            cod_universidad = %institution.cod_universidad,
            inserted = inserted > 0,
            "大学种子数据已就绪"
        );
        Ok(())
    }

    async fn insert_records(
        &self,
        entity: EntityType,
        records: &[EntityRecord],
    ) -> RepositoryResult<usize> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        // 出错时 tx 被 drop,自动回滚
        let count = Self::insert_records_tx(&tx, entity, records)?;

        tx.commit()?;
        Ok(count)
    }

    async fn fetch_key_set(&self, domain: KeyDomain) -> RepositoryResult<HashSet<String>> {
        let sql = match domain {
            KeyDomain::InstitutionCode => "SELECT cod_universidad FROM universidad",
            KeyDomain::InstitutionTaxId => "SELECT nifoc FROM universidad",
            KeyDomain::GrantCallId => "SELECT cod_convocatoria FROM convocatoria_ayuda",
        };

        let conn = self.lock()?;
        Ok(Self::query_strings(&conn, sql)?
            .into_iter()
            .flatten()
            .collect())
    }

    async fn fetch_unique_keys(&self, entity: EntityType) -> RepositoryResult<HashSet<UniqueKey>> {
        let sql = match entity {
            EntityType::ProcurementContract => "SELECT identificador, lote FROM licitacion",
            EntityType::GrantCall => "SELECT cod_convocatoria FROM convocatoria_ayuda",
            _ => return Ok(HashSet::new()),
        };

        let conn = self.lock()?;
        Ok(Self::query_strings(&conn, sql)?
            .into_iter()
            .map(UniqueKey)
            .collect())
    }

    async fn clear_entities(&self, entities: &[EntityType]) -> RepositoryResult<()> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;
        for entity in entities {
            let deleted = tx.execute(&format!("DELETE FROM {}", entity.table_name()), [])?;
            debug!(entity = %entity, deleted, "已清空实体表");
        }
        tx.commit()?;
        Ok(())
    }

    async fn count_records(&self, entity: EntityType) -> RepositoryResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", entity.table_name()),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
