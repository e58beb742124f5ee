use axum::{
    extract::{ConnectInfo, Path, Request, State},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::warn;

use crate::api::extractors::client_identity::client_identity;
use crate::domain::services::rate_limiter::{RateLimitTier, RateLimiter};
use crate::domain::services::token_validator::validate_token;
use crate::error::AppError;

#[derive(Clone)]
pub struct RateLimitGuard {
    pub limiter: Arc<RateLimiter>,
    pub tier: RateLimitTier,
    pub trust_proxy: bool,
}

/// Rejects the request before the handler runs once the caller's tier budget is spent.
pub async fn enforce_rate_limit(
    State(guard): State<RateLimitGuard>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let identity = client_identity(
        request.headers(),
        request.extensions().get::<ConnectInfo<SocketAddr>>(),
        guard.trust_proxy,
    );

    if let Err(e) = guard.limiter.check(guard.tier, &identity) {
        warn!(tier = guard.tier.as_str(), identity = %identity, path = %request.uri().path(), "Rate limit exceeded");
        return Err(e);
    }

    Ok(next.run(request).await)
}

/// Cheap structural check of the `{token}` path segment, ahead of any
/// throttled or stateful work.
pub async fn reject_malformed_token(
    Path(token): Path<String>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    validate_token(&token)?;
    Ok(next.run(request).await)
}
