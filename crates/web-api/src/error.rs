use application::ApplicationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use domain::{DomainError, RepositoryError};

use crate::envelope::ApiResponse;

const INTERNAL_MESSAGE: &str = "服务器内部错误，请稍后重试";

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: String,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "INVALID_ARGUMENT", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    /// 内部错误只记录日志，对外返回固定文案
    pub fn internal_server_error(detail: impl std::fmt::Display) -> Self {
        tracing::error!(error = %detail, "unhandled error");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            INTERNAL_MESSAGE,
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &str {
        &self.code
    }
}

impl From<DomainError> for ApiError {
    fn from(error: DomainError) -> Self {
        let message = error.to_string();
        match error {
            DomainError::ValidationError { .. } => ApiError::validation(message),
            DomainError::ResourceNotFound { .. } => ApiError::not_found(message),
            DomainError::ResourceAlreadyExists { .. } => {
                ApiError::new(StatusCode::CONFLICT, "ALREADY_EXISTS", message)
            }
            DomainError::BusinessRuleViolation { .. } => {
                ApiError::new(StatusCode::BAD_REQUEST, "INVALID_OPERATION", message)
            }
            DomainError::PermissionDenied { .. } => ApiError::forbidden(message),
        }
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        use ApplicationError as AppErr;

        match error {
            AppErr::Domain(err) => err.into(),
            AppErr::Business {
                code,
                status,
                message,
            } => {
                let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_REQUEST);
                ApiError::new(status, code, message)
            }
            AppErr::InvalidArgument(message) => ApiError::bad_request(message),
            AppErr::InvalidOperation(message) => {
                ApiError::new(StatusCode::BAD_REQUEST, "INVALID_OPERATION", message)
            }
            AppErr::NotFound { resource, id } => {
                ApiError::not_found(format!("{resource} not found: {id}"))
            }
            AppErr::Authentication(message) => ApiError::unauthorized(message),
            AppErr::Authorization(message) => ApiError::forbidden(message),
            AppErr::Repository(RepositoryError::NotFound) => {
                ApiError::not_found("requested resource not found")
            }
            AppErr::Repository(RepositoryError::Conflict(message)) => {
                ApiError::new(StatusCode::CONFLICT, "ALREADY_EXISTS", message)
            }
            other @ (AppErr::Repository(RepositoryError::Storage { .. })
            | AppErr::Password(_)
            | AppErr::Infrastructure(_)) => ApiError::internal_server_error(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()>::failure(self.code, self.message);
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapped(error: ApplicationError) -> (StatusCode, String) {
        let api: ApiError = error.into();
        (api.status(), api.code().to_owned())
    }

    #[test]
    fn maps_application_errors_to_status_and_code() {
        assert_eq!(
            mapped(ApplicationError::business("ROLE_PROTECTED", 400, "x")),
            (StatusCode::BAD_REQUEST, "ROLE_PROTECTED".into())
        );
        assert_eq!(
            mapped(ApplicationError::business("QUOTA", 429, "x")),
            (StatusCode::TOO_MANY_REQUESTS, "QUOTA".into())
        );
        assert_eq!(
            mapped(DomainError::validation_error("name", "empty").into()),
            (StatusCode::BAD_REQUEST, "VALIDATION_ERROR".into())
        );
        assert_eq!(
            mapped(ApplicationError::invalid_argument("bad")),
            (StatusCode::BAD_REQUEST, "INVALID_ARGUMENT".into())
        );
        assert_eq!(
            mapped(ApplicationError::invalid_operation("no")),
            (StatusCode::BAD_REQUEST, "INVALID_OPERATION".into())
        );
        assert_eq!(
            mapped(ApplicationError::authentication("who")),
            (StatusCode::UNAUTHORIZED, "UNAUTHORIZED".into())
        );
        assert_eq!(
            mapped(ApplicationError::authorization("no")),
            (StatusCode::FORBIDDEN, "FORBIDDEN".into())
        );
        assert_eq!(
            mapped(ApplicationError::not_found("role", "1")),
            (StatusCode::NOT_FOUND, "NOT_FOUND".into())
        );
        assert_eq!(
            mapped(RepositoryError::Conflict("dup".into()).into()),
            (StatusCode::CONFLICT, "ALREADY_EXISTS".into())
        );
        assert_eq!(
            mapped(DomainError::resource_already_exists("user", "a").into()),
            (StatusCode::CONFLICT, "ALREADY_EXISTS".into())
        );
    }

    #[test]
    fn unexpected_errors_hide_details() {
        let api: ApiError = ApplicationError::infrastructure("db password leaked").into();
        assert_eq!(api.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api.code(), "INTERNAL_ERROR");
        assert_eq!(api.message, INTERNAL_MESSAGE);
    }
}
