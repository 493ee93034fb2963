//! 错误类型定义

use thiserror::Error;

/// 运动匹配错误
#[derive(Error, Debug)]
pub enum MotionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Binary parse error: {0}")]
    Parse(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Shape mismatch in {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Learned motion matching networks are not loaded")]
    LearnedMotionUnavailable,
}

impl MotionError {
    /// 构造尺寸不匹配错误
    pub(crate) fn shape(what: &'static str, expected: usize, actual: usize) -> Self {
        MotionError::ShapeMismatch { what, expected, actual }
    }
}

/// 结果类型
pub type Result<T> = std::result::Result<T, MotionError>;
