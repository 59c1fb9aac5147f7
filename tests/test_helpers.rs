// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 临时数据库、临时源目录与 CSV 测试数据、Mock 配置
// ==========================================

#![allow(dead_code)]

use async_trait::async_trait;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tempfile::{NamedTempFile, TempDir};
use uni_opendata_ingest::config::IngestConfigReader;
use uni_opendata_ingest::domain::types::{EntityType, SourceEncoding};
use uni_opendata_ingest::importer::ImportResult;
use uni_opendata_ingest::{IngestOrchestrator, IngestRepositoryImpl, IngestSettings};

// ==========================================
// 数据库与编排器
// ==========================================

/// 创建临时测试数据库
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> (NamedTempFile, String) {
    let temp_file = NamedTempFile::new().unwrap();
    let db_path = temp_file.path().to_str().unwrap().to_string();
    (temp_file, db_path)
}

/// 测试用配置: 极短退避,两个文件并行准备
pub fn test_settings() -> IngestSettings {
    IngestSettings {
        storage_retry_backoff_ms: 1,
        storage_timeout_ms: 5_000,
        max_parallel_files: 2,
        ..IngestSettings::default()
    }
}

/// 基于 SQLite 仓储创建编排器（返回的仓储与编排器共享连接）
pub fn create_orchestrator(
    db_path: &str,
) -> (
    Arc<IngestRepositoryImpl>,
    IngestOrchestrator<IngestRepositoryImpl>,
) {
    let settings = test_settings();
    let repo = Arc::new(IngestRepositoryImpl::new(db_path).unwrap());
    repo.set_busy_timeout(settings.storage_timeout_ms).unwrap();
    let orchestrator = IngestOrchestrator::new(Arc::clone(&repo), settings).unwrap();
    (repo, orchestrator)
}

// ==========================================
// 源文件
// ==========================================

pub fn create_source_dir() -> TempDir {
    tempfile::tempdir().unwrap()
}

/// 写入 UTF-8 CSV（每个元素一行）
pub fn write_csv(dir: &Path, name: &str, lines: &[&str]) {
    let mut file = File::create(dir.join(name)).unwrap();
    for line in lines {
        writeln!(file, "{}", line).unwrap();
    }
}

/// 写入原始字节（用于 Latin-1 与损坏编码）
pub fn write_bytes(dir: &Path, name: &str, bytes: &[u8]) {
    std::fs::write(dir.join(name), bytes).unwrap();
}

pub const BUDGET_HEADER: &str = "cod_universidad,anio,cod_partida,des_capitulo,des_articulo,des_concepto,credito_inicial,modificaciones,credito_total";

pub const GRANT_CALL_HEADER: &str = "cod_convocatoria,cod_universidad,nombre_convocatoria,fecha_inicio_solicitudes,fecha_fin_solicitudes,des_categoria";

pub const GRANT_HEADER: &str = "cod_universidad,cod_convocatoria_ayuda,cuantia_total,anio,fecha_concesion";

pub const CONTRACT_HEADER: &str = "identificador,nif_oc,primera_publicacion,presupuesto_base_sin_impuestos_licitacion_o_lote,importe_adjudicacion_sin_impuestos_licitacion_o_lote,resultado_licitacion_o_lote,identificador_adjudicatario_de_la_licitacion_o_lote,objeto_licitacion_o_lote,link_licitacion,lote,adjudicatario_licitacion_o_lote,descripcion_de_la_financiacion_europea";

/// 资助项目征集文件（ISO-8859-1 编码）
pub fn grant_call_latin1_bytes() -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(GRANT_CALL_HEADER.as_bytes());
    bytes.push(b'\n');
    // í = 0xED
    bytes.extend_from_slice(b"C1,23,Becas de movilidad en Ingenier\xEDa,20210101,20210301,Movilidad\n");
    // ó = 0xF3; 开始日期晚于结束日期
    bytes.extend_from_slice(b"C2,23,Ayudas de investigaci\xF3n,20210501,20210401,Investigacion\n");
    bytes.extend_from_slice(b"C1,23,Duplicada,20210101,20210301,Movilidad\n");
    bytes
}

/// 标准测试数据集
///
/// | 文件                                   | 行 | 接受 | 拒绝 | 告警 |
/// |----------------------------------------|----|------|------|------|
/// | uam-ayudas-anonimizado-2021.csv        | 4  | 2    | 2    | 1    |
/// | uam-conv-ayudas-2021.csv               | 3  | 1    | 2    | 0    |
/// | uam-licitaciones-2019.csv              | 5  | 3    | 2    | 0    |
/// | uam-licitaciones-2020.csv              | 2  | 1    | 1    | 0    |
/// | uam-notas.csv                          | -  | 跳过 |      |      |
/// | uam-presupuesto-de-gastos-2019.csv     | 4  | 2    | 2    | 0    |
/// | uam-presupuesto-de-ingresos-2019.csv   | 1  | 1    | 0    | 0    |
pub fn write_standard_fixtures(dir: &Path) {
    write_csv(
        dir,
        "uam-presupuesto-de-gastos-2019.csv",
        &[
            BUDGET_HEADER,
            r#"23,2019,1.1,Gastos de personal,Altos cargos,Retribuciones,"1234,56","0,00","1234,56""#,
            "023,2019,1.2,Gastos de personal,Funcionarios,Sueldos,1234.56,100.00,1334.56",
            r#"99,2019,1.3,Otros,Otros,Otros,"10,00","0,00","10,00""#,
            "23,2019,1.4,Otros,Otros,Otros,abc,0,0",
        ],
    );

    write_csv(
        dir,
        "uam-presupuesto-de-ingresos-2019.csv",
        &[
            BUDGET_HEADER,
            r#"23,2019,3.1,Tasas,Precios publicos,Matricula,"5000,00","0,00","5000,00""#,
        ],
    );

    write_bytes(dir, "uam-conv-ayudas-2021.csv", &grant_call_latin1_bytes());

    write_csv(
        dir,
        "uam-ayudas-anonimizado-2021.csv",
        &[
            GRANT_HEADER,
            r#"23,C1,"1500,00",2021,20210615"#,
            r#"23,X,"200,00",2021,20210615"#,
            r#"23,C2,"300,00",,20210615"#,
            "23,C1,abc,2021,20210615",
        ],
    );

    write_csv(
        dir,
        "uam-licitaciones-2019.csv",
        &[
            CONTRACT_HEADER,
            r#"100,Q2818013A,2019-03-01 10:00:00,"1000,00","900,00",Adjudicada,B123,Obras,http://x/100,,Empresa A,"#,
            r#"100,Q2818013A,2019-03-01 10:00:00,"1000,00","900,00",Adjudicada,B123,Obras repetidas,http://x/100,,Empresa A,"#,
            r#"101,Q2818013A,2019-04-01 10:00:00,"500,00",,Desierta,,Suministros,http://x/101,1,,"#,
            r#"101,Q2818013A,2019-04-01 10:00:00,"600,00",,Desierta,,Suministros,http://x/101,2,,"#,
            r#"102,B00000000,2019-05-01 10:00:00,"50,00",,Adjudicada,,Servicios,http://x/102,,,"#,
        ],
    );

    write_csv(
        dir,
        "uam-licitaciones-2020.csv",
        &[
            CONTRACT_HEADER,
            r#"100,Q2818013A,2020-01-10 09:00:00,"1000,00","900,00",Adjudicada,B123,Obras,http://x/100,,Empresa A,"#,
            r#"103,Q2818013A,2020-02-10 09:00:00,"70,00","65,00",Adjudicada,B456,Limpieza,http://x/103,,Empresa B,"#,
        ],
    );

    write_csv(dir, "uam-notas.csv", &["titulo,comentario", "a,b"]);
}

// ==========================================
// Mock 配置
// ==========================================

/// Mock 配置结构
#[derive(Debug, Clone)]
pub struct MockConfigReader {
    pub storage_retry_attempts: u32,
    pub storage_retry_backoff_ms: u64,
    pub storage_timeout_ms: u64,
    pub max_parallel_files: usize,
    pub institution_code: String,
    pub institution_code_width: usize,
    pub institution_tax_id: String,
}

impl Default for MockConfigReader {
    fn default() -> Self {
        Self {
            storage_retry_attempts: 3,
            storage_retry_backoff_ms: 1,
            storage_timeout_ms: 5_000,
            max_parallel_files: 1,
            institution_code: "23".to_string(),
            institution_code_width: 3,
            institution_tax_id: "Q2818013A".to_string(),
        }
    }
}

#[async_trait]
impl IngestConfigReader for MockConfigReader {
    async fn get_storage_retry_attempts(&self) -> ImportResult<u32> {
        Ok(self.storage_retry_attempts)
    }

    async fn get_storage_retry_backoff_ms(&self) -> ImportResult<u64> {
        Ok(self.storage_retry_backoff_ms)
    }

    async fn get_storage_timeout_ms(&self) -> ImportResult<u64> {
        Ok(self.storage_timeout_ms)
    }

    async fn get_max_parallel_files(&self) -> ImportResult<usize> {
        Ok(self.max_parallel_files)
    }

    async fn get_institution_code(&self) -> ImportResult<String> {
        Ok(self.institution_code.clone())
    }

    async fn get_institution_code_width(&self) -> ImportResult<usize> {
        Ok(self.institution_code_width)
    }

    async fn get_institution_tax_id(&self) -> ImportResult<String> {
        Ok(self.institution_tax_id.clone())
    }

    async fn get_institution_name(&self) -> ImportResult<String> {
        Ok("Universidad Autonoma de Madrid".to_string())
    }

    async fn get_institution_short_name(&self) -> ImportResult<Option<String>> {
        Ok(Some("UAM".to_string()))
    }

    async fn get_encoding(&self, entity: EntityType) -> ImportResult<SourceEncoding> {
        Ok(entity.default_encoding())
    }
}
