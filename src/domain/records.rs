// ==========================================
// 高校开放数据入库系统 - 记录领域模型
// ==========================================
// 职责: 暂存行 → 标准化行 → 强类型实体记录
// 生命周期: 暂存行/标准化行仅在导入流程内; 实体记录通过校验后交给存储层
// ==========================================

use crate::domain::report::RejectReason;
use crate::domain::types::{EntityType, KeyDomain};
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

// ==========================================
// StagingRow - 暂存行
// ==========================================
// 原始、无类型的行（列名 → 原始值）
#[derive(Debug, Clone, Default)]
pub struct StagingRow {
    pub row_number: usize, // 数据行号（从 1 开始,不含表头）
    pub values: HashMap<String, String>,
}

// ==========================================
// CanonicalValue - 标准化后的单元格值
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CanonicalValue {
    Null,
    Decimal(Decimal),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    Code(String),
    Integer(i64),
    Text(String),
}

impl CanonicalValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CanonicalValue::Null)
    }

    /// 文本/编码/整数统一取字符串形式
    pub fn as_string(&self) -> Option<String> {
        match self {
            CanonicalValue::Code(s) | CanonicalValue::Text(s) => Some(s.clone()),
            CanonicalValue::Integer(i) => Some(i.to_string()),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            CanonicalValue::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            CanonicalValue::Date(d) => Some(*d),
            CanonicalValue::Timestamp(ts) => Some(ts.date()),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            CanonicalValue::Timestamp(ts) => Some(*ts),
            CanonicalValue::Date(d) => d.and_hms_opt(0, 0, 0),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            CanonicalValue::Integer(i) => Some(*i),
            _ => None,
        }
    }
}

// ==========================================
// FieldWarning - 可选字段降级告警
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldWarning {
    pub row_number: usize,
    pub field: String,
    pub message: String,
}

// ==========================================
// NormalizedRow - 标准化行
// ==========================================
// 只含目标字段（标准字段名 → 标准值）
#[derive(Debug, Clone, Default)]
pub struct NormalizedRow {
    pub row_number: usize,
    pub values: BTreeMap<&'static str, CanonicalValue>,
    pub warnings: Vec<FieldWarning>,
    pub source_year: Option<i32>, // 文件名中的年份（用于年份回退）
}

impl NormalizedRow {
    fn get(&self, field: &str) -> Option<&CanonicalValue> {
        self.values.get(field).filter(|v| !v.is_null())
    }

    pub fn string(&self, field: &str) -> Option<String> {
        self.get(field).and_then(CanonicalValue::as_string)
    }

    pub fn decimal(&self, field: &str) -> Option<Decimal> {
        self.get(field).and_then(CanonicalValue::as_decimal)
    }

    pub fn date(&self, field: &str) -> Option<NaiveDate> {
        self.get(field).and_then(CanonicalValue::as_date)
    }

    pub fn timestamp(&self, field: &str) -> Option<NaiveDateTime> {
        self.get(field).and_then(CanonicalValue::as_timestamp)
    }

    pub fn integer(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(CanonicalValue::as_integer)
    }

    /// 年份: 优先取列值,缺失时回退到文件名年份
    pub fn year_or_source(&self, field: &str) -> Option<i32> {
        self.integer(field)
            .and_then(|y| i32::try_from(y).ok())
            .or(self.source_year)
    }
}

// ==========================================
// Institution - 大学（根实体）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Institution {
    pub cod_universidad: String, // 定长编码（如 "023"）
    pub nifoc: String,           // 税号（唯一）
    pub des_universidad: String, // 名称
    pub nombre_corto: Option<String>,
}

// ==========================================
// BudgetLine - 预算行（支出/收入共用）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetLine {
    pub cod_universidad: String,
    pub anio: i32,
    pub cod_partida: Option<String>,
    pub des_capitulo: Option<String>,
    pub des_articulo: Option<String>,
    pub des_concepto: Option<String>,
    pub credito_inicial: Decimal,
    pub modificaciones: Decimal,
    pub credito_total: Decimal,
}

// ==========================================
// GrantCall - 资助项目征集
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrantCall {
    pub cod_convocatoria: String,
    pub cod_universidad: String,
    pub nombre_convocatoria: Option<String>,
    pub fecha_inicio_solicitudes: Option<NaiveDate>,
    pub fecha_fin_solicitudes: Option<NaiveDate>,
    pub des_categoria: Option<String>,
}

// ==========================================
// Grant - 资助发放（主键由存储层生成）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grant {
    pub cod_universidad: String,
    pub cod_convocatoria_ayuda: Option<String>, // 外键,缺失即校验失败
    pub cuantia_total: Option<Decimal>,
    pub anio: Option<i32>,
    pub fecha_concesion: Option<NaiveDate>,
}

// ==========================================
// ProcurementContract - 采购合同（按标段）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcurementContract {
    pub identificador: String,
    pub lote: String, // 缺失标段统一为 ""
    pub nif_oc: String,
    pub primera_publicacion: Option<NaiveDateTime>,
    pub presupuesto_base: Option<Decimal>,
    pub importe_adjudicacion: Option<Decimal>,
    pub resultado: Option<String>,
    pub identificador_adjudicatario: Option<String>,
    pub adjudicatario: Option<String>,
    pub objeto: Option<String>,
    pub link_licitacion: Option<String>,
    pub financiacion_europea: Option<String>,
}

// ==========================================
// ForeignKeyRef / UniqueKey
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyRef {
    pub field: &'static str,
    pub domain: KeyDomain,
    pub value: Option<String>,
}

/// 唯一键（可组合）; 可空分量已替换为哨兵值
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UniqueKey(pub Vec<String>);

impl fmt::Display for UniqueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|c| {
                if !c.is_empty() && c.chars().all(|ch| ch.is_ascii_digit()) {
                    c.clone()
                } else {
                    format!("{:?}", c)
                }
            })
            .collect();
        write!(f, "({})", parts.join(", "))
    }
}

// ==========================================
// EntityRecord - 强类型实体记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity", content = "record")]
pub enum EntityRecord {
    BudgetExpense(BudgetLine),
    BudgetIncome(BudgetLine),
    GrantCall(GrantCall),
    Grant(Grant),
    ProcurementContract(ProcurementContract),
}

impl EntityRecord {
    pub fn entity_type(&self) -> EntityType {
        match self {
            EntityRecord::BudgetExpense(_) => EntityType::BudgetExpense,
            EntityRecord::BudgetIncome(_) => EntityType::BudgetIncome,
            EntityRecord::GrantCall(_) => EntityType::GrantCall,
            EntityRecord::Grant(_) => EntityType::Grant,
            EntityRecord::ProcurementContract(_) => EntityType::ProcurementContract,
        }
    }

    /// 声明的外键
    pub fn foreign_keys(&self) -> Vec<ForeignKeyRef> {
        match self {
            EntityRecord::BudgetExpense(line) | EntityRecord::BudgetIncome(line) => {
                vec![institution_code_ref(&line.cod_universidad)]
            }
            EntityRecord::GrantCall(call) => vec![institution_code_ref(&call.cod_universidad)],
            EntityRecord::Grant(grant) => vec![
                institution_code_ref(&grant.cod_universidad),
                ForeignKeyRef {
                    field: "cod_convocatoria_ayuda",
                    domain: KeyDomain::GrantCallId,
                    value: grant.cod_convocatoria_ayuda.clone(),
                },
            ],
            EntityRecord::ProcurementContract(contract) => vec![ForeignKeyRef {
                field: "nif_oc",
                domain: KeyDomain::InstitutionTaxId,
                value: Some(contract.nif_oc.clone()),
            }],
        }
    }

    /// 实体声明的唯一键; None 表示该实体不参与去重
    pub fn unique_key(&self) -> Option<UniqueKey> {
        match self {
            EntityRecord::ProcurementContract(contract) => Some(UniqueKey(vec![
                contract.identificador.clone(),
                contract.lote.clone(),
            ])),
            EntityRecord::GrantCall(call) => {
                Some(UniqueKey(vec![call.cod_convocatoria.clone()]))
            }
            _ => None,
        }
    }
}

fn institution_code_ref(code: &str) -> ForeignKeyRef {
    ForeignKeyRef {
        field: "cod_universidad",
        domain: KeyDomain::InstitutionCode,
        value: Some(code.to_string()),
    }
}

// ==========================================
// RowOutcome - 行级处理结果
// ==========================================
// 行级拒绝是高频预期路径,以值而非错误表达
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Accepted(EntityRecord),
    Rejected(RejectReason),
}

impl RowOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, RowOutcome::Accepted(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contract(id: &str, lote: &str) -> EntityRecord {
        EntityRecord::ProcurementContract(ProcurementContract {
            identificador: id.to_string(),
            lote: lote.to_string(),
            nif_oc: "Q2818013A".to_string(),
            primera_publicacion: None,
            presupuesto_base: None,
            importe_adjudicacion: None,
            resultado: None,
            identificador_adjudicatario: None,
            adjudicatario: None,
            objeto: None,
            link_licitacion: None,
            financiacion_europea: None,
        })
    }

    #[test]
    fn test_unique_key_display() {
        let key = contract("100", "").unique_key().unwrap();
        assert_eq!(key.to_string(), "(100, \"\")");

        let key = contract("100", "Lote 2").unique_key().unwrap();
        assert_eq!(key.to_string(), "(100, \"Lote 2\")");
    }

    #[test]
    fn test_budget_line_has_no_unique_key() {
        let line = BudgetLine {
            cod_universidad: "023".to_string(),
            anio: 2017,
            cod_partida: None,
            des_capitulo: None,
            des_articulo: None,
            des_concepto: None,
            credito_inicial: Decimal::ZERO,
            modificaciones: Decimal::ZERO,
            credito_total: Decimal::ZERO,
        };
        let record = EntityRecord::BudgetExpense(line);
        assert_eq!(record.unique_key(), None);
        assert_eq!(record.foreign_keys().len(), 1);
        assert_eq!(record.entity_type(), EntityType::BudgetExpense);
    }

    #[test]
    fn test_grant_foreign_keys() {
        let record = EntityRecord::Grant(Grant {
            cod_universidad: "023".to_string(),
            cod_convocatoria_ayuda: None,
            cuantia_total: None,
            anio: Some(2017),
            fecha_concesion: None,
        });
        let fks = record.foreign_keys();
        assert_eq!(fks.len(), 2);
        assert_eq!(fks[1].field, "cod_convocatoria_ayuda");
        assert_eq!(fks[1].value, None);
    }

    #[test]
    fn test_year_or_source_fallback() {
        let mut row = NormalizedRow {
            row_number: 1,
            source_year: Some(2023),
            ..Default::default()
        };
        assert_eq!(row.year_or_source("anio"), Some(2023));

        row.values.insert("anio", CanonicalValue::Integer(2022));
        assert_eq!(row.year_or_source("anio"), Some(2022));
    }
}
