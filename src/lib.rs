// ==========================================
// 高校开放数据入库系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 年度开放数据 CSV → 规范化关系库（外键完整 + 去重）
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 导入层 - 外部数据
pub mod importer;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{EntityType, KeyDomain, RunMode, SourceEncoding, TargetType};

// 领域实体与报告
pub use domain::records::{EntityRecord, Institution, RowOutcome, UniqueKey};
pub use domain::report::{FileOutcome, FileStats, RejectReason, RunSummary, RunTotals};

// 导入
pub use importer::{ImportError, ImportResult, IngestOrchestrator, SchemaRegistry, StatsReporter};

// 仓储与配置
pub use config::{ConfigManager, IngestConfigReader, IngestSettings};
pub use repository::{IngestRepository, IngestRepositoryImpl, RepositoryError};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "高校开放数据入库系统";
