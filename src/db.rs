// ==========================================
// 高校开放数据入库系统 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为（外键约束每个连接单独开启）
// - 统一 busy_timeout,减少并发写入时的偶发 busy 错误
// - 建库 DDL 集中在此处（幂等）
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 建库 DDL（金额以 TEXT 存储十进制字符串,避免浮点误差）
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version    INTEGER NOT NULL,
    applied_at TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS config_kv (
    scope_id   TEXT NOT NULL,
    key        TEXT NOT NULL,
    value      TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (scope_id, key)
);

CREATE TABLE IF NOT EXISTS universidad (
    cod_universidad TEXT PRIMARY KEY,
    nifoc           TEXT NOT NULL UNIQUE,
    des_universidad TEXT NOT NULL,
    nombre_corto    TEXT
);

CREATE TABLE IF NOT EXISTS presupuesto_gastos (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    cod_universidad TEXT    NOT NULL REFERENCES universidad (cod_universidad),
    anio            INTEGER NOT NULL,
    cod_partida     TEXT,
    des_capitulo    TEXT,
    des_articulo    TEXT,
    des_concepto    TEXT,
    credito_inicial TEXT    NOT NULL,
    modificaciones  TEXT    NOT NULL,
    credito_total   TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS presupuesto_ingresos (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    cod_universidad TEXT    NOT NULL REFERENCES universidad (cod_universidad),
    anio            INTEGER NOT NULL,
    cod_partida     TEXT,
    des_capitulo    TEXT,
    des_articulo    TEXT,
    des_concepto    TEXT,
    credito_inicial TEXT    NOT NULL,
    modificaciones  TEXT    NOT NULL,
    credito_total   TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS convocatoria_ayuda (
    cod_convocatoria         TEXT PRIMARY KEY,
    cod_universidad          TEXT NOT NULL REFERENCES universidad (cod_universidad),
    nombre_convocatoria      TEXT,
    fecha_inicio_solicitudes TEXT,
    fecha_fin_solicitudes    TEXT,
    des_categoria            TEXT
);

CREATE TABLE IF NOT EXISTS ayuda (
    id                     INTEGER PRIMARY KEY AUTOINCREMENT,
    cod_universidad        TEXT NOT NULL REFERENCES universidad (cod_universidad),
    cod_convocatoria_ayuda TEXT NOT NULL REFERENCES convocatoria_ayuda (cod_convocatoria),
    cuantia_total          TEXT,
    anio                   INTEGER,
    fecha_concesion        TEXT
);

CREATE TABLE IF NOT EXISTS licitacion (
    identificador               TEXT NOT NULL,
    lote                        TEXT NOT NULL DEFAULT '',
    nif_oc                      TEXT NOT NULL REFERENCES universidad (nifoc),
    primera_publicacion         TEXT,
    presupuesto_base            TEXT,
    importe_adjudicacion        TEXT,
    resultado                   TEXT,
    identificador_adjudicatario TEXT,
    adjudicatario               TEXT,
    objeto                      TEXT,
    link_licitacion             TEXT,
    financiacion_europea        TEXT,
    PRIMARY KEY (identificador, lote)
);

CREATE INDEX IF NOT EXISTS idx_ayuda_convocatoria ON ayuda (cod_convocatoria_ayuda);
"#;

/// 配置 SQLite 连接的统一 PRAGMA
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 建表（幂等）并登记 schema_version
pub fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    if read_schema_version(conn)?.is_none() {
        conn.execute(
            "INSERT INTO schema_version (version, applied_at) VALUES (?1, datetime('now'))",
            [CURRENT_SCHEMA_VERSION],
        )?;
    }
    Ok(())
}

/// 读取 schema_version（若表不存在或为空则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}
