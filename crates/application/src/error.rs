use domain::{DomainError, RepositoryError};
use thiserror::Error;

use crate::password::PasswordHasherError;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("repository error: {0}")]
    Repository(RepositoryError),
    #[error("password error: {0}")]
    Password(#[from] PasswordHasherError),
    /// 业务异常，携带自定义错误码和 HTTP 状态码
    #[error("{message}")]
    Business {
        code: String,
        status: u16,
        message: String,
    },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("authorization failed: {0}")]
    Authorization(String),
}

impl ApplicationError {
    /// 创建基础设施错误
    pub fn infrastructure(message: impl Into<String>) -> Self {
        ApplicationError::Infrastructure(message.into())
    }

    pub fn business(code: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        ApplicationError::Business {
            code: code.into(),
            status,
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        ApplicationError::InvalidArgument(message.into())
    }

    pub fn invalid_operation(message: impl Into<String>) -> Self {
        ApplicationError::InvalidOperation(message.into())
    }

    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        ApplicationError::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        ApplicationError::Authentication(message.into())
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        ApplicationError::Authorization(message.into())
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        ApplicationError::Repository(value)
    }
}
