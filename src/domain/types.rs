// ==========================================
// 高校开放数据入库系统 - 领域类型定义
// ==========================================
// 职责: 实体类型 / 外键域 / 源文件编码 / 运行模式 / 目标字段类型
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 实体类型 (Entity Type)
// ==========================================
// 声明顺序即依赖顺序: 父实体在前,子实体在后
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Institution,         // 大学（种子数据,不从 CSV 派生）
    BudgetExpense,       // 支出预算
    BudgetIncome,        // 收入预算
    GrantCall,           // 资助项目征集
    Grant,               // 资助发放
    ProcurementContract, // 采购合同（按标段拆分）
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl EntityType {
    /// 按依赖顺序排列的全部实体类型
    pub const LOAD_ORDER: [EntityType; 6] = [
        EntityType::Institution,
        EntityType::BudgetExpense,
        EntityType::BudgetIncome,
        EntityType::GrantCall,
        EntityType::Grant,
        EntityType::ProcurementContract,
    ];

    /// 从 CSV 加载的实体类型（依赖顺序,不含 Institution）
    pub fn file_loaded() -> impl Iterator<Item = EntityType> {
        Self::LOAD_ORDER
            .into_iter()
            .filter(|e| *e != EntityType::Institution)
    }

    /// 直接父实体
    pub fn parents(&self) -> &'static [EntityType] {
        match self {
            EntityType::Institution => &[],
            EntityType::BudgetExpense
            | EntityType::BudgetIncome
            | EntityType::GrantCall
            | EntityType::ProcurementContract => &[EntityType::Institution],
            EntityType::Grant => &[EntityType::Institution, EntityType::GrantCall],
        }
    }

    /// 存储层表名
    pub fn table_name(&self) -> &'static str {
        match self {
            EntityType::Institution => "universidad",
            EntityType::BudgetExpense => "presupuesto_gastos",
            EntityType::BudgetIncome => "presupuesto_ingresos",
            EntityType::GrantCall => "convocatoria_ayuda",
            EntityType::Grant => "ayuda",
            EntityType::ProcurementContract => "licitacion",
        }
    }

    /// 源文件默认编码（各年度数据源不同）
    pub fn default_encoding(&self) -> SourceEncoding {
        match self {
            EntityType::Institution | EntityType::BudgetExpense | EntityType::BudgetIncome => {
                SourceEncoding::Utf8
            }
            EntityType::GrantCall | EntityType::Grant | EntityType::ProcurementContract => {
                SourceEncoding::Latin1
            }
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            EntityType::Institution => "INSTITUTION",
            EntityType::BudgetExpense => "BUDGET_EXPENSE",
            EntityType::BudgetIncome => "BUDGET_INCOME",
            EntityType::GrantCall => "GRANT_CALL",
            EntityType::Grant => "GRANT",
            EntityType::ProcurementContract => "PROCUREMENT_CONTRACT",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "INSTITUTION" => Some(EntityType::Institution),
            "BUDGET_EXPENSE" => Some(EntityType::BudgetExpense),
            "BUDGET_INCOME" => Some(EntityType::BudgetIncome),
            "GRANT_CALL" => Some(EntityType::GrantCall),
            "GRANT" => Some(EntityType::Grant),
            "PROCUREMENT_CONTRACT" => Some(EntityType::ProcurementContract),
            _ => None,
        }
    }
}

// ==========================================
// 外键域 (Key Domain)
// ==========================================
// 子记录外键所指向的父实体键集合
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyDomain {
    InstitutionCode,  // universidad.cod_universidad
    InstitutionTaxId, // universidad.nifoc
    GrantCallId,      // convocatoria_ayuda.cod_convocatoria
}

impl KeyDomain {
    /// 提供该键集合的实体
    pub fn owner(&self) -> EntityType {
        match self {
            KeyDomain::InstitutionCode | KeyDomain::InstitutionTaxId => EntityType::Institution,
            KeyDomain::GrantCallId => EntityType::GrantCall,
        }
    }
}

impl fmt::Display for KeyDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyDomain::InstitutionCode => write!(f, "INSTITUTION_CODE"),
            KeyDomain::InstitutionTaxId => write!(f, "INSTITUTION_TAX_ID"),
            KeyDomain::GrantCallId => write!(f, "GRANT_CALL_ID"),
        }
    }
}

// ==========================================
// 源文件编码
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceEncoding {
    Utf8,
    Latin1, // 单字节西欧编码（按 Windows-1252 解码,ISO-8859-1 的超集）
}

impl SourceEncoding {
    /// 回退编码
    pub fn fallback(&self) -> SourceEncoding {
        match self {
            SourceEncoding::Utf8 => SourceEncoding::Latin1,
            SourceEncoding::Latin1 => SourceEncoding::Utf8,
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "utf-8" | "utf8" => Some(SourceEncoding::Utf8),
            "latin-1" | "latin1" | "iso-8859-1" => Some(SourceEncoding::Latin1),
            _ => None,
        }
    }
}

impl fmt::Display for SourceEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceEncoding::Utf8 => write!(f, "utf-8"),
            SourceEncoding::Latin1 => write!(f, "latin-1"),
        }
    }
}

// ==========================================
// 运行模式
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Load,   // 首次加载
    Reload, // 先清空子实体再加载（幂等）
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Load => write!(f, "load"),
            RunMode::Reload => write!(f, "reload"),
        }
    }
}

// ==========================================
// 目标字段类型（标准化规则）
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetType {
    DecimalAmount,                    // 金额（两位小数,非负）
    CompactDate,                      // YYYYMMDD
    IsoDate,                          // YYYY-MM-DD
    Timestamp,                        // 日期时间
    FixedWidthCode { width: usize },  // 左补零定长编码
    Integer,                          // 年份等整数
    Text,                             // 文本
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetType::DecimalAmount => write!(f, "decimal-amount"),
            TargetType::CompactDate => write!(f, "compact-date"),
            TargetType::IsoDate => write!(f, "iso-date"),
            TargetType::Timestamp => write!(f, "timestamp"),
            TargetType::FixedWidthCode { width } => write!(f, "fixed-width-code({})", width),
            TargetType::Integer => write!(f, "integer"),
            TargetType::Text => write!(f, "text"),
        }
    }
}
