use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::links::ShortCodeError;
use crate::models::ParseFieldError;
use crate::storage::StorageError;

/// Errors surfaced by the redirect path and by link management.
#[derive(Debug, Error)]
pub enum AppError {
    /// Unknown host, short code or link
    #[error("not found")]
    NotFound,
    /// The link exists but is not active
    #[error("link is not active")]
    Gone,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Gone => StatusCode::GONE,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            AppError::NotFound => "URL not found".to_string(),
            AppError::Gone => "This link has been deactivated".to_string(),
            AppError::Internal(err) => {
                tracing::error!(error = %err, "request failed");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, message).into_response()
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict => AppError::Conflict("short code already exists".to_string()),
            StorageError::Other(e) => AppError::Internal(e),
        }
    }
}

impl From<ShortCodeError> for AppError {
    fn from(err: ShortCodeError) -> Self {
        match err {
            ShortCodeError::Conflict(code) => {
                AppError::Conflict(format!("short code '{code}' is already taken"))
            }
            ShortCodeError::Storage(e) => AppError::Internal(e),
            ShortCodeError::Exhausted => {
                AppError::Internal(anyhow::Error::new(ShortCodeError::Exhausted))
            }
            invalid => AppError::Validation(invalid.to_string()),
        }
    }
}

impl From<ParseFieldError> for AppError {
    fn from(err: ParseFieldError) -> Self {
        AppError::Validation(err.to_string())
    }
}
