use axum::{extract::ConnectInfo, http::HeaderMap};
use std::net::SocketAddr;

pub const UNKNOWN_IDENTITY: &str = "unknown";

/// Key the rate limiter counts against: the client IP, taken from the first
/// `X-Forwarded-For` hop when proxy headers are trusted.
pub fn client_identity(headers: &HeaderMap, connect_info: Option<&ConnectInfo<SocketAddr>>, trust_proxy: bool) -> String {
    if trust_proxy
        && let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok())
        && let Some(first) = forwarded.split(',').map(str::trim).find(|hop| !hop.is_empty())
    {
        return first.to_string();
    }

    connect_info
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_IDENTITY.to_string())
}
