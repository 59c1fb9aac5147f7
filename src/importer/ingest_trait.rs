// ==========================================
// 高校开放数据入库系统 - 导入管道 Trait
// ==========================================
// 职责: 定义导入管道各阶段接口（不包含实现）
// 管道: 解析 → 分类 → 映射/标准化 → 外键校验 → 去重 → 落库
// ==========================================

use crate::domain::records::{CanonicalValue, NormalizedRow, RowOutcome, StagingRow};
use crate::domain::report::{RejectReason, RowRejection};
use crate::domain::types::{EntityType, SourceEncoding, TargetType};
use crate::importer::error::ImportResult;
use crate::importer::locale_normalizer::FieldParseError;
use crate::importer::schema_registry::{EntitySchema, LayoutMapping};
use std::path::Path;

// ==========================================
// ParsedFile - 单文件解析结果
// ==========================================
#[derive(Debug, Clone)]
pub struct ParsedFile {
    pub header: Vec<String>,
    pub rows: Vec<StagingRow>,
    pub malformed_rows: Vec<RowRejection>, // 列数与表头不一致的行
    pub encoding: SourceEncoding,          // 实际采用的编码
}

impl ParsedFile {
    /// 读取的数据行数（不含表头与完全空白行）
    pub fn rows_read(&self) -> usize {
        self.rows.len() + self.malformed_rows.len()
    }
}

// ==========================================
// Classification - 文件分类结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub entity: EntityType,
    pub version: u32,
    pub source_year: Option<i32>, // 文件名中的年份
}

// ==========================================
// FileParser Trait
// ==========================================
// 用途: 文件解码与解析（阶段 0）
// 实现者: CsvParser
pub trait FileParser: Send + Sync {
    /// 仅读取表头（用于分类）
    ///
    /// # 返回
    /// - Ok(Vec<String>): 规范化后的列名（TRIM + 小写）
    /// - Err: 文件不可读、编码无法识别、无表头
    fn read_header(&self, file_path: &Path) -> ImportResult<Vec<String>>;

    /// 解析整个文件为暂存行
    ///
    /// # 参数
    /// - file_path: 文件路径
    /// - preferred: 首选编码（失败时回退到另一种编码）
    fn parse(&self, file_path: &Path, preferred: SourceEncoding) -> ImportResult<ParsedFile>;
}

// ==========================================
// FileClassifier Trait
// ==========================================
// 用途: 根据文件名与表头识别实体类型与版本（纯函数）
// 实现者: FileClassifierImpl
pub trait FileClassifier: Send + Sync {
    /// # 返回
    /// - Ok(Classification): 匹配到的实体类型、模式版本、来源年份
    /// - Err(ImportError::ClassificationFailed): 无匹配模式（跳过该文件,非致命）
    fn classify(&self, file_name: &str, header: &[String]) -> ImportResult<Classification>;
}

// ==========================================
// LocaleNormalizer Trait
// ==========================================
// 用途: 单元格标准化（纯函数）
// 实现者: LocaleNormalizerImpl
pub trait LocaleNormalizer: Send + Sync {
    fn normalize(&self, raw: &str, target: TargetType) -> Result<CanonicalValue, FieldParseError>;
}

// ==========================================
// FieldMapper Trait
// ==========================================
// 用途: 暂存行 → 标准化行 → 强类型实体记录
// 实现者: FieldMapperImpl
pub trait FieldMapper: Send + Sync {
    /// 按版本映射重命名列并标准化每个目标字段
    ///
    /// # 返回
    /// - Ok(NormalizedRow): 标准化行（可选字段降级告警记录在行上）
    /// - Err(RejectReason): 必填字段格式错误
    fn normalize_row(
        &self,
        row: &StagingRow,
        schema: &EntitySchema,
        layout: &LayoutMapping,
        source_year: Option<i32>,
    ) -> Result<NormalizedRow, RejectReason>;

    /// 标准化行 → 实体记录（含跨字段校验）
    fn build_record(&self, entity: EntityType, row: &NormalizedRow) -> RowOutcome;
}
