// ==========================================
// 高校开放数据入库系统 - 配置层
// ==========================================
// 职责: 入库配置管理,代码内缺省值 + config_kv 覆写
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod ingest_config_trait;

// 重导出核心配置管理器
pub use config_manager::{config_keys, defaults, ConfigManager, IngestSettings};
pub use ingest_config_trait::IngestConfigReader;
