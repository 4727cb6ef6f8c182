//! 领域模型错误定义
//!
//! 定义了校验错误以及持久化边界上的存储错误。

use thiserror::Error;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// 参数校验失败
    #[error("invalid argument {field}: {reason}")]
    InvalidArgument { field: String, reason: String },
}

impl DomainError {
    /// 创建参数校验错误
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// 存储后端错误
///
/// `TableAlreadyExists` 由后端的特定状态码识别，在幂等初始化中视为成功。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("table {table} already exists")]
    TableAlreadyExists { table: String },

    #[error("store unavailable: {message}")]
    Unavailable { message: String },

    #[error("invalid row {row_key}: {message}")]
    InvalidRow { row_key: String, message: String },
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn invalid_row(row_key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRow {
            row_key: row_key.into(),
            message: message.into(),
        }
    }
}
