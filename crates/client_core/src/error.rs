use reqwest::StatusCode;
use shared::error::{ApiError, ErrorCode, WorkflowError};
use thiserror::Error;

use crate::schema::SchemaError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("request could not complete: {0}")]
    NetworkFailure(String),
    #[error("session is not valid: {0}")]
    Unauthorized(String),
    #[error("not permitted: {0}")]
    Forbidden(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("rejected: {0}")]
    Validation(String),
    #[error("{0}")]
    AlreadyPending(String),
    #[error("{0}")]
    NotPending(String),
    #[error("{0}")]
    InvalidTransition(String),
    #[error("{0}")]
    DependencyConflict(String),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },
}

impl CoreError {
    /// Maps a non-success response. The body code wins when the server sent
    /// one; bare 401/403 still map to the session errors.
    pub fn from_response(status: StatusCode, body: Option<ApiError>) -> Self {
        match body {
            Some(err) => Self::from_api(status, err),
            None => match status {
                StatusCode::UNAUTHORIZED => Self::Unauthorized(status.to_string()),
                StatusCode::FORBIDDEN => Self::Forbidden(status.to_string()),
                StatusCode::NOT_FOUND => Self::NotFound(status.to_string()),
                _ => Self::Server {
                    status: status.as_u16(),
                    message: status
                        .canonical_reason()
                        .unwrap_or("unexpected response")
                        .to_string(),
                },
            },
        }
    }

    fn from_api(status: StatusCode, err: ApiError) -> Self {
        let ApiError { code, message } = err;
        match code {
            ErrorCode::Unauthorized => Self::Unauthorized(message),
            ErrorCode::Forbidden => Self::Forbidden(message),
            ErrorCode::NotFound => Self::NotFound(message),
            ErrorCode::Validation => Self::Validation(message),
            ErrorCode::AlreadyPending => Self::AlreadyPending(message),
            ErrorCode::NotPending => Self::NotPending(message),
            ErrorCode::InvalidTransition => Self::InvalidTransition(message),
            ErrorCode::DependencyConflict => Self::DependencyConflict(message),
            ErrorCode::Internal => Self::Server {
                status: status.as_u16(),
                message,
            },
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}

impl From<WorkflowError> for CoreError {
    fn from(err: WorkflowError) -> Self {
        let message = err.to_string();
        match err {
            WorkflowError::AlreadyPending { .. } => Self::AlreadyPending(message),
            WorkflowError::NotPending { .. } => Self::NotPending(message),
            WorkflowError::InvalidTransition { .. } => Self::InvalidTransition(message),
        }
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(err: reqwest::Error) -> Self {
        Self::NetworkFailure(err.to_string())
    }
}

#[cfg(test)]
#[path = "tests/error_tests.rs"]
mod tests;
