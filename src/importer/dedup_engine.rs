// ==========================================
// 高校开放数据入库系统 - 去重引擎
// ==========================================
// 规则: 按 文件 → 行 顺序,首次出现的唯一键胜出,后续出现一律拒绝（不覆盖）
// 范围: 同一运行内跨文件; 追加加载时以存储中已有键为起点
// ==========================================

use crate::domain::records::{EntityRecord, RowOutcome, UniqueKey};
use crate::domain::report::RejectReason;
use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct DedupEngine {
    seen: HashSet<UniqueKey>,
}

impl DedupEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以已存在的键为起点（跨批次重复检测）
    pub fn with_existing(existing: impl IntoIterator<Item = UniqueKey>) -> Self {
        Self {
            seen: existing.into_iter().collect(),
        }
    }

    /// 检查并登记; 重复时返回拒绝原因
    pub fn check(&mut self, record: &EntityRecord) -> Result<(), RejectReason> {
        match record.unique_key() {
            None => Ok(()),
            Some(key) if self.seen.contains(&key) => Err(RejectReason::Duplicate { key }),
            Some(key) => {
                self.seen.insert(key);
                Ok(())
            }
        }
    }

    pub fn apply(&mut self, outcome: RowOutcome) -> RowOutcome {
        match outcome {
            RowOutcome::Accepted(record) => match self.check(&record) {
                Ok(()) => RowOutcome::Accepted(record),
                Err(reason) => RowOutcome::Rejected(reason),
            },
            rejected => rejected,
        }
    }

    /// 撤销登记（所在文件整体写入失败时,其键不应阻挡后续文件）
    pub fn forget<'a>(&mut self, keys: impl IntoIterator<Item = &'a UniqueKey>) {
        for key in keys {
            self.seen.remove(key);
        }
    }
}
