use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use crate::error::AppError;
use crate::state::AppState;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::warn;

/// Caller is the host service. Requires `Authorization: Bearer <HOST_API_TOKEN>`
/// when a host token is configured.
pub struct HostAuth;

impl FromRequestParts<Arc<AppState>> for HostAuth {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.config.host_api_token.as_deref() else {
            return Ok(HostAuth);
        };

        let presented = parts.headers.get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(AppError::Unauthorized)?;

        let matches: bool = presented.as_bytes().ct_eq(expected.as_bytes()).into();
        if !matches {
            warn!(path = %parts.uri.path(), "Rejected host request with invalid token");
            return Err(AppError::Unauthorized);
        }

        Ok(HostAuth)
    }
}
