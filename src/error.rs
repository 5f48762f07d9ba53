use thiserror::Error;

/// 库内统一错误类型。
///
/// "查不到" 不是错误：查询缺失的 k-mer 返回空位置列表。
/// 内存耗尽同样不建模为错误（无恢复路径）。
#[derive(Error, Debug)]
pub enum IndexError {
    /// 参数非法：k / w 越界、查询 key 长度不符、contig 过长、fetch 区间越界等
    #[error("invalid parameter `{name}` = {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    /// Hamming 距离两条输入不等长
    #[error("sequence length mismatch: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },

    #[error("unknown contig '{0}'")]
    UnknownContig(String),

    /// 持久化文件结构或一致性校验失败
    #[error("corrupt index artifact: {0}")]
    CorruptArtifact(String),

    /// 索引尚未进入 Built 状态
    #[error("index is not built yet")]
    NotBuilt,

    /// Built 之后不允许再写入
    #[error("index is already built and read-only")]
    AlreadyBuilt,

    #[error("index build cancelled")]
    Cancelled,

    #[error("invalid FASTA at line {line}: {message}")]
    Fasta { line: usize, message: String },

    #[error("thread pool build error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IndexError>;

impl IndexError {
    pub(crate) fn invalid(name: &'static str, value: impl ToString, reason: impl Into<String>) -> Self {
        IndexError::InvalidParameter {
            name,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}
