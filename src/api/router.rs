use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderValue},
    middleware::from_fn,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use crate::state::AppState;
use crate::api::handlers::{guest_pass, health, host};
use crate::api::middleware::{
    rate_limit::{enforce_rate_limit, reject_malformed_token, RateLimitGuard},
    transport::{content_security_policy, enforce_https, HttpsPolicy, HSTS_POLICY},
};
use crate::domain::services::rate_limiter::RateLimitTier;
use tower_http::{
    classify::ServerErrorsFailureClass,
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info_span, Span, error, info};
use uuid::Uuid;

pub fn create_router(state: Arc<AppState>) -> Router {
    let guard = |tier: RateLimitTier| RateLimitGuard {
        limiter: state.rate_limiter.clone(),
        tier,
        trust_proxy: state.config.trust_proxy_headers,
    };

    let api = Router::new()
        // Host
        .route("/api/v1/guest-passes", post(host::create_guest_pass).layer(from_fn_with_state(guard(RateLimitTier::Create), enforce_rate_limit)))
        .route("/api/v1/events/{event_id}/guest-passes", get(host::list_event_passes))
        .route("/api/v1/host/guest-passes/{pass_id}/revoke", post(host::revoke_guest_pass))

        // Guest
        .route("/api/v1/guest-passes/{token}", get(guest_pass::get_guest_pass)
            .layer(from_fn(reject_malformed_token)))
        .route("/api/v1/guest-passes/{token}/rsvp", post(guest_pass::rsvp_guest_pass)
            .layer(from_fn_with_state(guard(RateLimitTier::Rsvp), enforce_rate_limit))
            .layer(from_fn(reject_malformed_token)))
        .route("/api/v1/guest-passes/{token}/qr", get(guest_pass::get_guest_pass_qr)
            .layer(from_fn(reject_malformed_token)))

        // Door
        .route("/api/v1/guest-passes/{token}/scan", post(guest_pass::scan_guest_pass)
            .layer(from_fn_with_state(guard(RateLimitTier::Scan), enforce_rate_limit))
            .layer(from_fn(reject_malformed_token)))

        .route_layer(from_fn_with_state(guard(RateLimitTier::General), enforce_rate_limit));

    Router::new()
        .route("/health", get(health::health_check))
        .merge(api)
        .layer(from_fn_with_state(
            HttpsPolicy {
                enforce: state.config.enforce_https,
                trust_proxy: state.config.trust_proxy_headers,
            },
            enforce_https,
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CONTENT_SECURITY_POLICY,
            content_security_policy(&state.config.payment_origins),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static(HSTS_POLICY),
        ))
        .layer(SetResponseHeaderLayer::overriding(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")))
        .layer(SetResponseHeaderLayer::overriding(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY")))
        .layer(SetResponseHeaderLayer::overriding(header::REFERRER_POLICY, HeaderValue::from_static("no-referrer")))
        .layer(SetResponseHeaderLayer::overriding(header::CACHE_CONTROL, HeaderValue::from_static("no-store")))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<Body>| {
                    let request_id = Uuid::new_v4().to_string();
                    info_span!(
                        "http_request",
                        request_id = %request_id,
                        method = ?request.method(),
                        path = %request.uri().path(),
                        version = ?request.version(),
                    )
                })
                .on_request(|request: &Request<Body>, _span: &Span| {
                    info!("started processing request: {} {}", request.method(), request.uri().path());
                })
                .on_response(|response: &axum::http::Response<Body>, latency: Duration, _span: &Span| {
                    info!(
                        status = response.status().as_u16(),
                        latency_ms = latency.as_millis(),
                        "finished processing request"
                    );
                })
                .on_failure(|error: ServerErrorsFailureClass, _latency: Duration, _span: &Span| {
                    error!("request failed: {:?}", error);
                })
        )
        .with_state(state)
}
