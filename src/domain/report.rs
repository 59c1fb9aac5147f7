// ==========================================
// 高校开放数据入库系统 - 统计与拒绝台账模型
// ==========================================
// 职责: 行级拒绝原因 / 文件级统计 / 运行汇总
// 红线: 统计只追加、可合并（计数求和,台账取并集）
// ==========================================

use crate::domain::records::{FieldWarning, UniqueKey};
use crate::domain::types::{EntityType, RunMode, SourceEncoding};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ==========================================
// RejectReason - 行级拒绝原因
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectReason {
    MalformedField { field: String, message: String },
    MalformedRow { message: String },
    UnresolvedForeignKey { field: String },
    Duplicate { key: UniqueKey },
    InvalidDateRange { from_field: String, to_field: String },
}

impl RejectReason {
    /// 统计归类键（同类原因合并计数）
    pub fn summary_key(&self) -> String {
        match self {
            RejectReason::MalformedField { field, .. } => format!("malformed field: {}", field),
            RejectReason::MalformedRow { .. } => "malformed row".to_string(),
            RejectReason::UnresolvedForeignKey { field } => {
                format!("unresolved foreign key: {}", field)
            }
            RejectReason::Duplicate { .. } => "duplicate".to_string(),
            RejectReason::InvalidDateRange { .. } => "invalid date range".to_string(),
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::MalformedField { field, message } => {
                write!(f, "malformed field: {} ({})", field, message)
            }
            RejectReason::MalformedRow { message } => write!(f, "malformed row: {}", message),
            RejectReason::UnresolvedForeignKey { field } => {
                write!(f, "unresolved foreign key: {}", field)
            }
            RejectReason::Duplicate { key } => write!(f, "duplicate: {}", key),
            RejectReason::InvalidDateRange { from_field, to_field } => {
                write!(f, "invalid date range: {} > {}", from_field, to_field)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowRejection {
    pub row_number: usize,
    pub reason: RejectReason,
}

// ==========================================
// FileOutcome - 文件级结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileOutcome {
    Loaded,
    Skipped { reason: String },      // 分类失败,非致命
    Fatal { error: String },         // 文件级致命错误
    NotProcessed,                    // 运行在该文件之前被中止
}

// ==========================================
// FileStats - 单文件统计
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileStats {
    pub file_name: String,
    pub entity: Option<EntityType>,
    pub schema_version: Option<u32>,
    pub encoding: Option<SourceEncoding>,
    pub rows_read: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub rejected_by_reason: BTreeMap<String, usize>,
    pub warning_count: usize,
    pub rejections: Vec<RowRejection>,
    pub warnings: Vec<FieldWarning>,
    pub outcome: FileOutcome,
}

impl FileStats {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            entity: None,
            schema_version: None,
            encoding: None,
            rows_read: 0,
            accepted: 0,
            rejected: 0,
            rejected_by_reason: BTreeMap::new(),
            warning_count: 0,
            rejections: Vec::new(),
            warnings: Vec::new(),
            outcome: FileOutcome::Loaded,
        }
    }

    pub fn record_rejected(&mut self, row_number: usize, reason: RejectReason) {
        self.rejected += 1;
        *self
            .rejected_by_reason
            .entry(reason.summary_key())
            .or_insert(0) += 1;
        self.rejections.push(RowRejection { row_number, reason });
    }

    pub fn record_warnings(&mut self, warnings: impl IntoIterator<Item = FieldWarning>) {
        for warning in warnings {
            self.warning_count += 1;
            self.warnings.push(warning);
        }
    }

    /// 合并同一文件的分段统计（计数求和,台账取并集）
    pub fn merge(&mut self, other: FileStats) {
        self.rows_read += other.rows_read;
        self.accepted += other.accepted;
        self.rejected += other.rejected;
        for (reason, count) in other.rejected_by_reason {
            *self.rejected_by_reason.entry(reason).or_insert(0) += count;
        }
        self.warning_count += other.warning_count;
        self.rejections.extend(other.rejections);
        self.warnings.extend(other.warnings);
        if !matches!(other.outcome, FileOutcome::Loaded) {
            self.outcome = other.outcome;
        }
    }

    /// 文件级失败时,已统计的接受数不再成立
    pub fn mark_fatal(&mut self, error: impl Into<String>) {
        self.accepted = 0;
        self.outcome = FileOutcome::Fatal {
            error: error.into(),
        };
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self.outcome, FileOutcome::Fatal { .. })
    }
}

// ==========================================
// RunSummary - 运行汇总
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub mode: RunMode,
    pub source_dir: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub aborted: bool,
    pub files: Vec<FileStats>,
}

/// 跨文件合计
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunTotals {
    pub files: usize,
    pub rows_read: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub warnings: usize,
    pub rejected_by_reason: BTreeMap<String, usize>,
    pub skipped_files: usize,
    pub fatal_files: usize,
}

impl RunSummary {
    pub fn totals(&self) -> RunTotals {
        let mut totals = RunTotals {
            files: self.files.len(),
            ..Default::default()
        };
        for file in &self.files {
            totals.rows_read += file.rows_read;
            totals.accepted += file.accepted;
            totals.rejected += file.rejected;
            totals.warnings += file.warning_count;
            for (reason, count) in &file.rejected_by_reason {
                *totals.rejected_by_reason.entry(reason.clone()).or_insert(0) += count;
            }
            match file.outcome {
                FileOutcome::Skipped { .. } => totals.skipped_files += 1,
                FileOutcome::Fatal { .. } => totals.fatal_files += 1,
                _ => {}
            }
        }
        totals
    }

    pub fn fatal_file_count(&self) -> usize {
        self.files.iter().filter(|f| f.is_fatal()).count()
    }

    /// 退出码判定: 无文件级致命错误且未中止
    pub fn is_success(&self) -> bool {
        !self.aborted && self.fatal_file_count() == 0
    }

    pub fn file(&self, file_name: &str) -> Option<&FileStats> {
        self.files.iter().find(|f| f.file_name == file_name)
    }
}
