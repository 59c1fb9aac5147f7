// ==========================================
// 高校开放数据入库系统 - 统计与错误报告
// ==========================================
// 职责: 每个文件一条结构化日志事件 + 运行汇总 JSON 渲染
// ==========================================

use crate::domain::report::{FileOutcome, FileStats, RunSummary, RunTotals};
use crate::importer::error::{ImportError, ImportResult};
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

/// 汇总报告（运行信息 + 合计 + 成功标志）
#[derive(Debug, Serialize)]
pub struct SummaryReport<'a> {
    #[serde(flatten)]
    pub summary: &'a RunSummary,
    pub totals: RunTotals,
    pub success: bool,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StatsReporter;

impl StatsReporter {
    pub fn new() -> Self {
        Self
    }

    /// 单文件结构化日志
    pub fn log_file(&self, stats: &FileStats) {
        let entity = stats
            .entity
            .map(|e| e.to_string())
            .unwrap_or_else(|| "-".to_string());
        let encoding = stats
            .encoding
            .map(|e| e.to_string())
            .unwrap_or_else(|| "-".to_string());
        let by_reason = serde_json::to_string(&stats.rejected_by_reason).unwrap_or_default();

        match &stats.outcome {
            FileOutcome::Loaded => info!(
                file = %stats.file_name,
                entity = %entity,
                schema_version = stats.schema_version.unwrap_or(0),
                encoding = %encoding,
                rows_read = stats.rows_read,
                accepted = stats.accepted,
                rejected = stats.rejected,
                warnings = stats.warning_count,
                rejected_by_reason = %by_reason,
                "文件入库完成"
            ),
            FileOutcome::Skipped { reason } => warn!(
                file = %stats.file_name,
                reason = %reason,
                "文件无法分类,已跳过"
            ),
            FileOutcome::Fatal { error } => warn!(
                file = %stats.file_name,
                entity = %entity,
                rows_read = stats.rows_read,
                error = %error,
                "文件级致命错误,未入库"
            ),
            FileOutcome::NotProcessed => warn!(
                file = %stats.file_name,
                entity = %entity,
                "运行已中止,文件未处理"
            ),
        }
    }

    /// 运行结束汇总日志
    pub fn log_summary(&self, summary: &RunSummary) {
        let totals = summary.totals();
        info!(
            run_id = %summary.run_id,
            mode = %summary.mode,
            files = totals.files,
            rows_read = totals.rows_read,
            accepted = totals.accepted,
            rejected = totals.rejected,
            warnings = totals.warnings,
            skipped_files = totals.skipped_files,
            fatal_files = totals.fatal_files,
            aborted = summary.aborted,
            "入库运行结束"
        );
    }

    pub fn report<'a>(&self, summary: &'a RunSummary) -> SummaryReport<'a> {
        SummaryReport {
            summary,
            totals: summary.totals(),
            success: summary.is_success(),
        }
    }

    /// 渲染汇总 JSON
    pub fn render_json(&self, summary: &RunSummary) -> ImportResult<String> {
        serde_json::to_string_pretty(&self.report(summary))
            .map_err(|e| ImportError::InternalError(format!("汇总序列化失败: {}", e)))
    }

    /// 写出汇总报告文件
    pub fn write_report(&self, summary: &RunSummary, path: &Path) -> ImportResult<()> {
        let json = self.render_json(summary)?;
        std::fs::write(path, json)?;
        info!(path = %path.display(), "汇总报告已写出");
        Ok(())
    }
}
