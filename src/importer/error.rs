// ==========================================
// 高校开放数据入库系统 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// 范围: 文件级错误与配置错误; 行级拒绝不走错误通道
// ==========================================

use crate::domain::types::EntityType;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 文件相关错误 =====
    #[error("文件不存在: {0}")]
    FileNotFound(String),

    #[error("源目录不可用: {0}")]
    SourceDirError(String),

    #[error("文件读取失败: {0}")]
    FileReadError(String),

    #[error("CSV 解析失败: {0}")]
    CsvParseError(String),

    #[error("文件编码无法识别 ({file}): 已尝试 {tried}")]
    EncodingError { file: String, tried: String },

    #[error("文件无表头: {0}")]
    MissingHeader(String),

    // ===== 分类与模式错误 =====
    #[error("无匹配的已注册模式: {0}")]
    ClassificationFailed(String),

    #[error("模式配置错误 ({entity} v{version}): {message}")]
    SchemaConfig {
        entity: EntityType,
        version: u32,
        message: String,
    },

    #[error("未注册的模式: {entity} v{version}")]
    UnknownSchema { entity: EntityType, version: u32 },

    // ===== 存储错误 =====
    #[error("存储写入失败 (已尝试 {attempts} 次): {message}")]
    StorageFailed { attempts: u32, message: String },

    #[error("存储错误: {0}")]
    Storage(#[from] RepositoryError),

    // ===== 配置错误 =====
    #[error("配置值格式错误 (key: {key}, value: {value}): {message}")]
    ConfigValueError {
        key: String,
        value: String,
        message: String,
    },

    // ===== 通用错误 =====
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// 实现 From<std::io::Error>
impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::FileReadError(err.to_string())
    }
}

// 实现 From<csv::Error>
impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::CsvParseError(err.to_string())
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;
