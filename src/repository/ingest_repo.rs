// ==========================================
// 高校开放数据入库系统 - 入库 Repository Trait
// ==========================================
// 职责: 定义入库所需的数据访问接口（不包含实现）
// 红线: Repository 不含业务规则,只做数据 CRUD
// ==========================================

use crate::domain::records::{EntityRecord, Institution, UniqueKey};
use crate::domain::types::{EntityType, KeyDomain};
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;
use std::collections::HashSet;

// ==========================================
// IngestRepository Trait
// ==========================================
// 用途: 导入编排器的存储协作方
// 实现者: IngestRepositoryImpl（使用 rusqlite）
#[async_trait]
pub trait IngestRepository: Send + Sync {
    /// 写入大学种子数据（幂等 upsert）
    async fn seed_institution(&self, institution: &Institution) -> RepositoryResult<()>;

    /// 批量写入同一实体类型的记录（单事务,失败整体回滚）
    ///
    /// # 返回
    /// - Ok(usize): 写入的记录数
    async fn insert_records(
        &self,
        entity: EntityType,
        records: &[EntityRecord],
    ) -> RepositoryResult<usize>;

    /// 读取某外键域的全部已存在键（用于构建外键索引）
    async fn fetch_key_set(&self, domain: KeyDomain) -> RepositoryResult<HashSet<String>>;

    /// 读取某实体已存在的唯一键（用于跨批次去重）; 无唯一键的实体返回空集
    async fn fetch_unique_keys(&self, entity: EntityType) -> RepositoryResult<HashSet<UniqueKey>>;

    /// 按给定顺序清空实体表
    async fn clear_entities(&self, entities: &[EntityType]) -> RepositoryResult<()>;

    /// 实体表记录数
    async fn count_records(&self, entity: EntityType) -> RepositoryResult<usize>;
}
