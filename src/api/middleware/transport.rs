use axum::{
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tracing::debug;

use crate::error::AppError;

pub const HSTS_POLICY: &str = "max-age=63072000; includeSubDomains";

#[derive(Clone, Copy)]
pub struct HttpsPolicy {
    pub enforce: bool,
    pub trust_proxy: bool,
}

/// Sends plain-HTTP requests to their HTTPS equivalent when enforcement is on.
/// Behind a TLS-terminating proxy `X-Forwarded-Proto` is the signal, honoured
/// only when proxy headers are trusted.
pub async fn enforce_https(
    State(policy): State<HttpsPolicy>,
    request: Request,
    next: Next,
) -> Response {
    if !policy.enforce || is_secure(&request, policy.trust_proxy) {
        return next.run(request).await;
    }

    let Some(host) = request.headers().get(header::HOST).and_then(|h| h.to_str().ok()) else {
        return AppError::Validation("Missing Host header".into()).into_response();
    };
    let path = request.uri().path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let location = format!("https://{host}{path}");

    debug!(location = %location, "Redirecting insecure request");
    Redirect::permanent(&location).into_response()
}

fn is_secure(request: &Request, trust_proxy: bool) -> bool {
    if request.uri().scheme_str() == Some("https") {
        return true;
    }
    if !trust_proxy {
        return false;
    }
    request.headers()
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .is_some_and(|proto| proto.trim().eq_ignore_ascii_case("https"))
}

/// CSP allowing only this origin plus the payment processor's origins.
pub fn content_security_policy(payment_origins: &[String]) -> HeaderValue {
    let origins: Vec<&str> = payment_origins
        .iter()
        .map(String::as_str)
        .filter(|o| o.starts_with("https://") && o.bytes().all(|b| b.is_ascii_graphic() && b != b';' && b != b','))
        .collect();
    let extra = if origins.is_empty() { String::new() } else { format!(" {}", origins.join(" ")) };

    let policy = format!(
        "default-src 'self'; script-src 'self'{extra}; style-src 'self'; frame-src 'self'{extra}; \
         connect-src 'self'{extra}; img-src 'self' data:; object-src 'none'; base-uri 'self'; \
         form-action 'self'; frame-ancestors 'none'"
    );
    HeaderValue::from_str(&policy).unwrap_or_else(|_| HeaderValue::from_static("default-src 'self'"))
}
