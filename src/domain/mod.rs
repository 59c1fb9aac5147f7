// ==========================================
// 高校开放数据入库系统 - 领域模型层
// ==========================================
// 职责: 定义实体类型、记录、统计与拒绝台账
// 红线: 不含数据访问逻辑,不含导入流程逻辑
// ==========================================

pub mod records;
pub mod report;
pub mod types;

// 重导出核心类型
pub use records::{
    BudgetLine, CanonicalValue, EntityRecord, FieldWarning, ForeignKeyRef, Grant, GrantCall,
    Institution, NormalizedRow, ProcurementContract, RowOutcome, StagingRow, UniqueKey,
};
pub use report::{FileOutcome, FileStats, RejectReason, RowRejection, RunSummary, RunTotals};
pub use types::{EntityType, KeyDomain, RunMode, SourceEncoding, TargetType};
