// crates/bw_foundation/src/error.rs

//! 基础错误类型
//!
//! 定义整个工作空间的基础错误类型。致命错误不直接终止进程，而是
//! 作为带上下文的类型化错误向上传播：每个 rank 在中止前都经过同
//! 一个错误汇聚点，保证日志有序。
//!
//! # 错误分层
//!
//! ```text
//! 高层错误 (bw_physics, bw_surface, bw_config)
//!        ↓ (转换)
//! 基础错误 ← 你在这里 (bw_foundation::BwError)
//! ```

use thiserror::Error;

/// 基础错误类型
///
/// 仅包含 IO、索引、数值等基础类别；高层错误通过 `#[from]` 或
/// [`BwError::Fatal`] 汇入。
#[derive(Debug, Error)]
pub enum BwError {
    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 索引越界
    #[error("Index out of bounds: {context} (index {index}, size {size})")]
    IndexOutOfBounds {
        /// 出错位置说明
        context: String,
        /// 违规索引
        index: i64,
        /// 容器大小
        size: usize,
    },

    /// 数值错误（NaN、发散、双曲性破坏等）
    #[error("Numerical error: {0}")]
    Numerical(String),

    /// 无效输入
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// 致命错误（所有 rank 同步中止前的汇聚点）
    #[error("Fatal: {0}")]
    Fatal(String),
}

impl BwError {
    /// 创建数值错误
    pub fn numerical(msg: impl Into<String>) -> Self {
        Self::Numerical(msg.into())
    }

    /// 创建无效输入错误
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// 创建致命错误
    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }

    /// 是否为致命错误
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

/// 基础 Result 别名
pub type BwResult<T> = Result<T, BwError>;
