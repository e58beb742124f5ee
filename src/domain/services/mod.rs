pub mod expiration;
pub mod guest_pass_service;
pub mod nonce_verifier;
pub mod qr_rotation;
pub mod rate_limiter;
pub mod token_validator;

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::AppError;

/// Bounds a store call. An elapsed deadline surfaces as a retryable
/// `StorageUnavailable`; the dropped future rolls back any open transaction.
pub async fn with_store_timeout<T, F>(limit: Duration, fut: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            warn!(timeout_ms = limit.as_millis() as u64, "Store call timed out");
            Err(AppError::StorageUnavailable)
        }
    }
}
