// ==========================================
// 高校开放数据入库系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有值使用参数化写入,表名只来自实体类型常量
// ==========================================

pub mod error;
pub mod ingest_repo;
pub mod ingest_repo_impl;

// 重导出核心仓储
pub use error::{RepositoryError, RepositoryResult};
pub use ingest_repo::IngestRepository;
pub use ingest_repo_impl::IngestRepositoryImpl;
