// ==========================================
// 高校开放数据入库系统 - 导入层
// ==========================================
// 职责: 源目录 CSV → 分类 → 标准化 → 外键校验 → 去重 → 落库
// 支持: UTF-8 / ISO-8859-1 编码的 CSV
// ==========================================

// 模块声明
pub mod dedup_engine;
pub mod error;
pub mod field_mapper;
pub mod file_classifier;
pub mod file_parser;
pub mod ingest_orchestrator;
pub mod ingest_trait;
pub mod locale_normalizer;
pub mod ref_validator;
pub mod schema_registry;
pub mod stats_reporter;

// 重导出核心类型
pub use dedup_engine::DedupEngine;
pub use error::{ImportError, ImportResult};
pub use field_mapper::{FieldMapper as FieldMapperImpl, MappedRow};
pub use file_classifier::FileClassifierImpl;
pub use file_parser::CsvParser;
pub use ingest_orchestrator::IngestOrchestrator;
pub use locale_normalizer::{FieldParseError, LocaleNormalizer as LocaleNormalizerImpl};
pub use ref_validator::{KeyIndex, ReferentialValidator};
pub use schema_registry::{EntitySchema, FieldSpec, LayoutMapping, SchemaRegistry};
pub use stats_reporter::StatsReporter;

// 重导出 Trait 接口
pub use ingest_trait::{
    Classification, FieldMapper, FileClassifier, FileParser, LocaleNormalizer, ParsedFile,
};
