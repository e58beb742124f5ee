use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Malformed guest pass token or QR payload")]
    InvalidFormat,
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Too many requests")]
    RateLimited { retry_after: Duration },
    #[error("Resource not found: {0}")]
    NotFound(String),
    #[error("Guest pass has already been used")]
    AlreadyUsed,
    #[error("Guest pass has expired")]
    Expired,
    #[error("Guest pass has been revoked")]
    Revoked,
    #[error("Guest pass is not active")]
    NotActive,
    #[error("QR code is invalid or has expired")]
    InvalidOrExpiredToken,
    #[error("Scan payload rejected")]
    ReplayDetected,
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Storage unavailable")]
    StorageUnavailable,
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Internal server error")]
    Internal,
}

impl AppError {
    /// Stable machine-readable code carried in every error body.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidFormat => "INVALID_FORMAT",
            AppError::Validation(_) => "VALIDATION_FAILED",
            AppError::RateLimited { .. } => "RATE_LIMITED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::AlreadyUsed => "ALREADY_USED",
            AppError::Expired => "EXPIRED",
            AppError::Revoked => "REVOKED",
            AppError::NotActive => "NOT_ACTIVE",
            AppError::InvalidOrExpiredToken => "INVALID_OR_EXPIRED_TOKEN",
            AppError::ReplayDetected => "REPLAY_DETECTED",
            AppError::Unauthorized => "UNAUTHORIZED",
            AppError::StorageUnavailable => "STORAGE_UNAVAILABLE",
            AppError::Database(e) if is_transient(e) => "STORAGE_UNAVAILABLE",
            AppError::Database(_) | AppError::Internal => "INTERNAL",
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::RateLimited { .. } | AppError::StorageUnavailable => true,
            AppError::Database(e) => is_transient(e),
            _ => false,
        }
    }
}

fn is_transient(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::WorkerCrashed
    )
}

// Whole seconds, rounded up, never zero.
pub fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    secs.max(1)
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let (status, message, retry_after) = match &self {
            AppError::InvalidFormat => (StatusCode::BAD_REQUEST, self.to_string(), None),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
            AppError::RateLimited { retry_after } => {
                (StatusCode::TOO_MANY_REQUESTS, self.to_string(), Some(retry_after_secs(*retry_after)))
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone(), None),
            AppError::AlreadyUsed
            | AppError::Expired
            | AppError::Revoked
            | AppError::NotActive
            | AppError::InvalidOrExpiredToken => (StatusCode::CONFLICT, self.to_string(), None),
            AppError::ReplayDetected => (StatusCode::FORBIDDEN, self.to_string(), None),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string(), None),
            AppError::StorageUnavailable => {
                (StatusCode::SERVICE_UNAVAILABLE, "Service temporarily unavailable".to_string(), Some(1))
            }
            AppError::Database(e) if is_transient(e) => {
                error!("Transient database error: {:?}", e);
                (StatusCode::SERVICE_UNAVAILABLE, "Service temporarily unavailable".to_string(), Some(1))
            }
            AppError::Database(e) => {
                error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".to_string(), None)
            }
            AppError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".to_string(), None),
        };

        let body = Json(json!({
            "error": message,
            "code": code,
        }));

        let mut response = (status, body).into_response();
        if let Some(secs) = retry_after {
            response.headers_mut().insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}
