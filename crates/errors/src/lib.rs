//! errors - 统一错误处理
//!
//! 所有失败都以 `AppError` 返回给调用方。调用方看到的任何错误都意味着没有发生状态变更。

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 应用错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 输入不合法或状态不允许编辑，在任何写入之前发现
    #[error("Validation error: {0}")]
    Validation(String),

    /// 提交时资源已被其他操作占用（槽位、序列号、源容器）
    #[error("Conflict: {0}")]
    Conflict(String),

    /// 引用的实体不存在
    #[error("Consistency error: {0}")]
    Consistency(String),

    /// 基础设施原因导致事务中止，已全部回滚，可安全重试
    #[error("Transaction aborted: {0}")]
    TransactionAborted(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn consistency(msg: impl Into<String>) -> Self {
        Self::Consistency(msg.into())
    }

    /// 引用的实体未找到
    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        Self::Consistency(format!("{} {} not found", entity, id))
    }

    pub fn transaction_aborted(msg: impl Into<String>) -> Self {
        Self::TransactionAborted(msg.into())
    }

    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    pub fn external_service(msg: impl Into<String>) -> Self {
        Self::ExternalService(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// 是否可以整体重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransactionAborted(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// 稳定的错误类别标签，用于指标
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Consistency(_) => ErrorKind::Consistency,
            Self::TransactionAborted(_) => ErrorKind::TransactionAborted,
            Self::Database(_) => ErrorKind::Database,
            Self::ExternalService(_) => ErrorKind::ExternalService,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Conflict,
    Consistency,
    TransactionAborted,
    Database,
    ExternalService,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Conflict => "conflict",
            Self::Consistency => "consistency",
            Self::TransactionAborted => "transaction_aborted",
            Self::Database => "database",
            Self::ExternalService => "external_service",
            Self::Internal => "internal",
        }
    }
}

/// Result 类型别名
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_aborted_transactions_are_retryable() {
        assert!(AppError::transaction_aborted("serialization failure").is_retryable());
        assert!(!AppError::conflict("slot taken").is_retryable());
        assert!(!AppError::database("syntax error").is_retryable());
    }

    #[test]
    fn test_not_found_is_consistency() {
        let err = AppError::not_found("container", "c-1");
        assert_eq!(err.kind(), ErrorKind::Consistency);
        assert_eq!(err.to_string(), "Consistency error: container c-1 not found");
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(AppError::validation("x").kind().as_str(), "validation");
        assert_eq!(
            AppError::transaction_aborted("x").kind().as_str(),
            "transaction_aborted"
        );
    }
}
