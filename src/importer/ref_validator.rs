// ==========================================
// 高校开放数据入库系统 - 外键完整性校验器
// ==========================================
// 职责: 子记录的每个外键必须存在于父实体已接受的键集合中
// 前置: 父实体类型全部写入后,由编排器从存储层构建键索引
// ==========================================

use crate::domain::records::{EntityRecord, RowOutcome};
use crate::domain::report::RejectReason;
use crate::domain::types::KeyDomain;
use std::collections::{HashMap, HashSet};

// ==========================================
// KeyIndex - 父实体键索引
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct KeyIndex {
    keys: HashMap<KeyDomain, HashSet<String>>,
}

impl KeyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, domain: KeyDomain, key: impl Into<String>) {
        self.keys.entry(domain).or_default().insert(key.into());
    }

    pub fn extend(&mut self, domain: KeyDomain, keys: impl IntoIterator<Item = String>) {
        self.keys.entry(domain).or_default().extend(keys);
    }

    pub fn contains(&self, domain: KeyDomain, key: &str) -> bool {
        self.keys
            .get(&domain)
            .map(|set| set.contains(key))
            .unwrap_or(false)
    }
}

// ==========================================
// ReferentialValidator
// ==========================================
pub struct ReferentialValidator {
    index: KeyIndex,
}

impl ReferentialValidator {
    pub fn new(index: KeyIndex) -> Self {
        Self { index }
    }

    /// 校验单条记录; 首个无法解析的外键决定拒绝原因
    pub fn check(&self, record: &EntityRecord) -> Result<(), RejectReason> {
        for fk in record.foreign_keys() {
            let resolved = fk
                .value
                .as_deref()
                .map(|v| self.index.contains(fk.domain, v))
                .unwrap_or(false);
            if !resolved {
                return Err(RejectReason::UnresolvedForeignKey {
                    field: fk.field.to_string(),
                });
            }
        }
        Ok(())
    }

    /// 对行结果应用外键校验（已拒绝的行原样返回）
    pub fn validate(&self, outcome: RowOutcome) -> RowOutcome {
        match outcome {
            RowOutcome::Accepted(record) => match self.check(&record) {
                Ok(()) => RowOutcome::Accepted(record),
                Err(reason) => RowOutcome::Rejected(reason),
            },
            rejected => rejected,
        }
    }
}
