// ==========================================
// 高校开放数据入库系统 - 入库编排器
// ==========================================
// 流程: 发现 → (重载清表) → 大学种子 → 分类 → 按依赖顺序逐实体:
//       建外键索引 → 并行准备文件 → 顺序去重 → 单文件单事务落库
// 红线: 行级拒绝不中断文件; 文件级失败不中断运行
// ==========================================

use crate::config::IngestSettings;
use crate::domain::records::{RowOutcome, UniqueKey};
use crate::domain::report::{FileOutcome, FileStats, RunSummary};
use crate::domain::types::{EntityType, KeyDomain, RunMode, SourceEncoding};
use crate::importer::dedup_engine::DedupEngine;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::field_mapper::FieldMapper;
use crate::importer::file_classifier::FileClassifierImpl;
use crate::importer::file_parser::CsvParser;
use crate::importer::ingest_trait::{Classification, FileClassifier, FileParser};
use crate::importer::ref_validator::{KeyIndex, ReferentialValidator};
use crate::importer::schema_registry::SchemaRegistry;
use crate::importer::stats_reporter::StatsReporter;
use crate::repository::{IngestRepository, RepositoryError, RepositoryResult};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

const KEY_DOMAINS: [KeyDomain; 3] = [
    KeyDomain::InstitutionCode,
    KeyDomain::InstitutionTaxId,
    KeyDomain::GrantCallId,
];

/// 已分类、待处理的文件
#[derive(Debug, Clone)]
struct PlannedFile {
    path: PathBuf,
    file_name: String,
    classification: Classification,
}

impl PlannedFile {
    fn base_stats(&self, encoding: SourceEncoding) -> FileStats {
        let mut stats = FileStats::new(self.file_name.clone());
        stats.entity = Some(self.classification.entity);
        stats.schema_version = Some(self.classification.version);
        stats.encoding = Some(encoding);
        stats
    }
}

/// 准备完毕（已映射、已外键校验）的文件,行结果按行号排序
struct PreparedFile {
    stats: FileStats,
    outcomes: Vec<(usize, RowOutcome)>,
}

/// 阻塞线程上准备文件所需的共享组件
#[derive(Clone)]
struct PrepareContext {
    parser: Arc<dyn FileParser>,
    mapper: Arc<FieldMapper>,
    registry: Arc<SchemaRegistry>,
    validator: Arc<ReferentialValidator>,
    encoding: SourceEncoding,
}

// ==========================================
// IngestOrchestrator - 入库编排器
// ==========================================
pub struct IngestOrchestrator<R>
where
    R: IngestRepository,
{
    // 数据访问层
    repo: Arc<R>,

    // 运行配置（已解析）
    settings: IngestSettings,

    // 管道组件
    registry: Arc<SchemaRegistry>,
    file_parser: Arc<dyn FileParser>,
    classifier: Box<dyn FileClassifier>,
    field_mapper: Arc<FieldMapper>,
    reporter: StatsReporter,

    // 协作式中止标志（文件之间检查）
    abort: Arc<AtomicBool>,
}

impl<R> IngestOrchestrator<R>
where
    R: IngestRepository,
{
    /// 使用内置模式注册表与默认组件创建编排器
    pub fn new(repo: Arc<R>, settings: IngestSettings) -> ImportResult<Self> {
        let registry = Arc::new(SchemaRegistry::builtin_with_code_width(
            settings.institution_code_width,
        )?);
        Ok(Self::with_components(
            repo,
            settings,
            Arc::clone(&registry),
            Arc::new(CsvParser),
            Box::new(FileClassifierImpl::new(registry)),
        ))
    }

    /// 注入自定义注册表/解析器/分类器
    pub fn with_components(
        repo: Arc<R>,
        settings: IngestSettings,
        registry: Arc<SchemaRegistry>,
        file_parser: Arc<dyn FileParser>,
        classifier: Box<dyn FileClassifier>,
    ) -> Self {
        Self {
            repo,
            settings,
            registry,
            file_parser,
            classifier,
            field_mapper: Arc::new(FieldMapper::new()),
            reporter: StatsReporter::new(),
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 中止句柄（如 Ctrl-C 处理器持有）
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    pub fn settings(&self) -> &IngestSettings {
        &self.settings
    }

    pub fn reporter(&self) -> &StatsReporter {
        &self.reporter
    }

    fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    /// 执行一次入库运行
    ///
    /// # 返回
    /// - Ok(RunSummary): 运行汇总（文件级失败记录在汇总中）
    /// - Err: 运行前置步骤失败（源目录不可用、清表或大学种子写入失败）
    #[instrument(skip(self, source_dir), fields(run_id))]
    pub async fn run(&self, source_dir: &Path, mode: RunMode) -> ImportResult<RunSummary> {
        let run_id = Uuid::new_v4().to_string();
        tracing::Span::current().record("run_id", run_id.as_str());
        let started_at = Utc::now();
        info!(run_id = %run_id, source_dir = %source_dir.display(), "开始入库运行");

        // === 步骤 1: 发现文件 ===
        debug!("步骤 1: 发现文件");
        let files = discover_files(source_dir)?;
        info!(file_count = files.len(), "文件发现完成");

        // === 步骤 2: 重载模式清表 ===
        if mode == RunMode::Reload {
            debug!("步骤 2: 按依赖逆序清空实体表");
            let mut entities: Vec<EntityType> = EntityType::file_loaded().collect();
            entities.reverse();
            self.with_retry("clear_entities", || self.repo.clear_entities(&entities))
                .await?;
        }

        // === 步骤 3: 大学种子 ===
        debug!("步骤 3: 写入大学种子数据");
        let institution = &self.settings.institution;
        self.with_retry("seed_institution", || self.repo.seed_institution(institution))
            .await?;

        // === 步骤 4: 分类 ===
        debug!("步骤 4: 读取表头并分类");
        let mut results: Vec<FileStats> = Vec::with_capacity(files.len());
        let mut plan: BTreeMap<EntityType, Vec<PlannedFile>> = BTreeMap::new();
        for path in files {
            let file_name = file_name_of(&path);
            let classified = self
                .file_parser
                .read_header(&path)
                .and_then(|header| self.classifier.classify(&file_name, &header));

            match classified {
                Ok(classification) => {
                    debug!(
                        file = %file_name,
                        entity = %classification.entity,
                        version = classification.version,
                        "文件分类完成"
                    );
                    plan.entry(classification.entity)
                        .or_default()
                        .push(PlannedFile {
                            path,
                            file_name,
                            classification,
                        });
                }
                // 空文件或空表头不匹配任何布局,与分类失败同样跳过
                Err(e @ ImportError::MissingHeader(_)) => {
                    let mut stats = FileStats::new(file_name);
                    stats.outcome = FileOutcome::Skipped {
                        reason: e.to_string(),
                    };
                    self.reporter.log_file(&stats);
                    results.push(stats);
                }
                Err(ImportError::ClassificationFailed(reason)) => {
                    let mut stats = FileStats::new(file_name);
                    stats.outcome = FileOutcome::Skipped { reason };
                    self.reporter.log_file(&stats);
                    results.push(stats);
                }
                Err(e) => {
                    let mut stats = FileStats::new(file_name);
                    stats.mark_fatal(e.to_string());
                    self.reporter.log_file(&stats);
                    results.push(stats);
                }
            }
        }

        // === 步骤 5: 按依赖顺序逐实体加载 ===
        for entity in EntityType::file_loaded() {
            let Some(planned) = plan.remove(&entity) else {
                continue;
            };
            debug!(entity = %entity, files = planned.len(), "步骤 5: 加载实体");
            let stats = self.load_entity(entity, planned).await;
            results.extend(stats);
        }

        results.sort_by(|a, b| a.file_name.cmp(&b.file_name));

        let summary = RunSummary {
            run_id,
            mode,
            source_dir: source_dir.display().to_string(),
            started_at,
            finished_at: Some(Utc::now()),
            aborted: self.is_aborted(),
            files: results,
        };
        self.reporter.log_summary(&summary);
        Ok(summary)
    }

    /// 单个实体类型的全部文件
    async fn load_entity(&self, entity: EntityType, planned: Vec<PlannedFile>) -> Vec<FileStats> {
        let encoding = self.settings.encoding_for(entity);

        if self.is_aborted() {
            return planned
                .iter()
                .map(|p| self.not_processed(p, encoding))
                .collect();
        }

        // 外键索引与去重起点均来自存储
        let index = match self.build_key_index(entity).await {
            Ok(index) => index,
            Err(e) => return self.fail_all(&planned, encoding, &e),
        };
        let existing = match self
            .with_retry("fetch_unique_keys", || self.repo.fetch_unique_keys(entity))
            .await
        {
            Ok(keys) => keys,
            Err(e) => return self.fail_all(&planned, encoding, &e),
        };
        let mut dedup = DedupEngine::with_existing(existing);

        let ctx = PrepareContext {
            parser: Arc::clone(&self.file_parser),
            mapper: Arc::clone(&self.field_mapper),
            registry: Arc::clone(&self.registry),
            validator: Arc::new(ReferentialValidator::new(index)),
            encoding,
        };

        // 并行准备,按文件名顺序消费
        let abort = Arc::clone(&self.abort);
        let mut prepared = stream::iter(planned.into_iter().map(|file| {
            let ctx = ctx.clone();
            let abort = Arc::clone(&abort);
            async move {
                if abort.load(Ordering::SeqCst) {
                    return (file, None);
                }
                let task_file = file.clone();
                let result = tokio::task::spawn_blocking(move || prepare_file(&ctx, &task_file))
                    .await
                    .map_err(|e| ImportError::InternalError(format!("文件准备任务失败: {}", e)))
                    .and_then(|r| r);
                (file, Some(result))
            }
        }))
        .buffered(self.settings.max_parallel_files.max(1));

        let mut results = Vec::new();
        while let Some((file, result)) = prepared.next().await {
            let stats = match result {
                _ if self.is_aborted() => self.not_processed(&file, encoding),
                None => self.not_processed(&file, encoding),
                Some(Err(e)) => {
                    let mut stats = file.base_stats(encoding);
                    stats.mark_fatal(e.to_string());
                    stats
                }
                Some(Ok(prepared_file)) => self.persist_file(entity, prepared_file, &mut dedup).await,
            };
            self.reporter.log_file(&stats);
            results.push(stats);
        }
        results
    }

    /// 父实体提供的键集合
    async fn build_key_index(&self, entity: EntityType) -> ImportResult<KeyIndex> {
        let mut index = KeyIndex::new();
        for domain in KEY_DOMAINS
            .into_iter()
            .filter(|d| entity.parents().contains(&d.owner()))
        {
            let keys = self
                .with_retry("fetch_key_set", || self.repo.fetch_key_set(domain))
                .await?;
            debug!(entity = %entity, domain = %domain, keys = keys.len(), "外键索引已建立");
            index.extend(domain, keys);
        }
        Ok(index)
    }

    /// 顺序去重后单事务落库
    async fn persist_file(
        &self,
        entity: EntityType,
        prepared: PreparedFile,
        dedup: &mut DedupEngine,
    ) -> FileStats {
        let PreparedFile {
            mut stats,
            outcomes,
        } = prepared;

        let mut accepted = Vec::new();
        for (row_number, outcome) in outcomes {
            match dedup.apply(outcome) {
                RowOutcome::Accepted(record) => accepted.push(record),
                RowOutcome::Rejected(reason) => stats.record_rejected(row_number, reason),
            }
        }

        if accepted.is_empty() {
            return stats;
        }

        let keys: Vec<UniqueKey> = accepted.iter().filter_map(|r| r.unique_key()).collect();
        match self
            .with_retry("insert_records", || self.repo.insert_records(entity, &accepted))
            .await
        {
            Ok(inserted) => stats.accepted += inserted,
            Err(e) => {
                // 事务已回滚,释放该文件登记的键
                dedup.forget(&keys);
                stats.mark_fatal(e.to_string());
            }
        }
        stats
    }

    /// 存储交接: 瞬时错误按指数退避重试,每次尝试受超时约束
    ///
    /// 超时只对会让出执行权的仓储生效; SQLite 仓储同步执行,
    /// 其等待上限是按同一配置设置的 busy_timeout
    async fn with_retry<T, F, Fut>(&self, operation: &str, mut op: F) -> ImportResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RepositoryResult<T>>,
    {
        let attempts = self.settings.storage_retry_attempts.max(1);
        let timeout_ms = self.settings.storage_timeout_ms;
        let mut attempt = 1;
        loop {
            let result = match tokio::time::timeout(Duration::from_millis(timeout_ms), op()).await
            {
                Ok(result) => result,
                Err(_) => Err(RepositoryError::Timeout { timeout_ms }),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < attempts => {
                    let backoff = self
                        .settings
                        .storage_retry_backoff_ms
                        .saturating_mul(1u64 << (attempt - 1).min(16));
                    warn!(
                        operation,
                        attempt,
                        backoff_ms = backoff,
                        error = %e,
                        "存储操作瞬时失败,退避后重试"
                    );
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                    attempt += 1;
                }
                Err(e) if e.is_transient() => {
                    return Err(ImportError::StorageFailed {
                        attempts,
                        message: e.to_string(),
                    })
                }
                Err(e) => return Err(ImportError::Storage(e)),
            }
        }
    }

    fn not_processed(&self, file: &PlannedFile, encoding: SourceEncoding) -> FileStats {
        let mut stats = file.base_stats(encoding);
        stats.outcome = FileOutcome::NotProcessed;
        stats
    }

    fn fail_all(
        &self,
        planned: &[PlannedFile],
        encoding: SourceEncoding,
        error: &ImportError,
    ) -> Vec<FileStats> {
        warn!(error = %error, "实体前置查询失败,该实体全部文件记为致命");
        planned
            .iter()
            .map(|file| {
                let mut stats = file.base_stats(encoding);
                stats.mark_fatal(error.to_string());
                self.reporter.log_file(&stats);
                stats
            })
            .collect()
    }
}

// ==========================================
// 文件准备（阻塞线程）
// ==========================================

/// 解码 → 解析 → 映射/标准化 → 外键校验
fn prepare_file(ctx: &PrepareContext, file: &PlannedFile) -> ImportResult<PreparedFile> {
    let classification = &file.classification;
    let schema = ctx.registry.schema(classification.entity)?;
    let layout = ctx
        .registry
        .lookup(classification.entity, classification.version)?;

    let parsed = ctx.parser.parse(&file.path, ctx.encoding)?;

    let mut stats = file.base_stats(parsed.encoding);
    stats.rows_read = parsed.rows_read();

    let mut outcomes: Vec<(usize, RowOutcome)> = parsed
        .malformed_rows
        .into_iter()
        .map(|m| (m.row_number, RowOutcome::Rejected(m.reason)))
        .collect();

    for row in &parsed.rows {
        let mapped = ctx
            .mapper
            .map_row(row, schema, layout, classification.source_year);
        stats.record_warnings(mapped.warnings);
        outcomes.push((mapped.row_number, ctx.validator.validate(mapped.outcome)));
    }
    outcomes.sort_by_key(|(row_number, _)| *row_number);

    Ok(PreparedFile { stats, outcomes })
}

/// 源目录下的 *.csv（不区分大小写）,按文件名排序
pub fn discover_files(source_dir: &Path) -> ImportResult<Vec<PathBuf>> {
    let entries = std::fs::read_dir(source_dir).map_err(|e| {
        ImportError::SourceDirError(format!("{}: {}", source_dir.display(), e))
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        if path.is_file() && is_csv {
            files.push(path);
        }
    }
    files.sort_by_key(|p| file_name_of(p));
    Ok(files)
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
