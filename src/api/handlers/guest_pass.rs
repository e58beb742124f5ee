use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use crate::state::AppState;
use crate::api::dtos::{
    requests::{RsvpRequest, ScanRequest},
    responses::{GuestPassView, QrResponse, RsvpResponse, ScanResponse},
};
use crate::domain::ports::RsvpDetails;
use crate::domain::services::guest_pass_service::{parse_qr_payload, RsvpOutcome};
use crate::domain::services::token_validator::validate_token_value;
use crate::error::AppError;
use std::sync::Arc;
use tracing::info;

pub async fn get_guest_pass(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let pass = state.guest_pass_service.find_by_token(&token).await?;
    Ok(Json(GuestPassView::from(pass)))
}

pub async fn rsvp_guest_pass(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    payload: Result<Json<RsvpRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let payload = match payload {
        Ok(Json(payload)) => payload,
        Err(JsonRejection::MissingJsonContentType(_)) => RsvpRequest::default(),
        Err(_) => return Err(AppError::Validation("Malformed RSVP body".into())),
    };

    let details = RsvpDetails {
        guest_name: payload.name,
        guest_email: payload.email,
        payment_reference: payload.payment_reference,
    };

    match state.guest_pass_service.rsvp(&token, details).await? {
        RsvpOutcome::Activated(pass) => Ok((
            StatusCode::OK,
            Json(RsvpResponse { payment_required: false, pass: pass.into() }),
        )),
        RsvpOutcome::AwaitingPayment(pass) => Ok((
            StatusCode::ACCEPTED,
            Json(RsvpResponse { payment_required: true, pass: pass.into() }),
        )),
    }
}

pub async fn get_guest_pass_qr(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let qr = state.guest_pass_service.qr(&token).await?;
    Ok(Json(QrResponse::from(qr)))
}

pub async fn scan_guest_pass(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    payload: Result<Json<ScanRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(payload) = payload.map_err(|_| AppError::InvalidFormat)?;

    let from_code = payload.code.as_ref()
        .map(|code| validate_token_value(code).and_then(parse_qr_payload))
        .transpose()?;
    let nonce = payload.nonce.as_ref().map(validate_token_value).transpose()?;

    let nonce = match (from_code, nonce) {
        (Some((code_token, _)), _) if code_token != token => return Err(AppError::InvalidFormat),
        (Some((_, code_nonce)), Some(nonce)) if !code_nonce.eq_ignore_ascii_case(nonce) => {
            return Err(AppError::InvalidFormat);
        }
        (Some((_, code_nonce)), _) => code_nonce,
        (None, Some(nonce)) => nonce,
        (None, None) => return Err(AppError::InvalidFormat),
    };

    let pass = state.guest_pass_service.scan(&token, nonce).await?;
    info!(scanner_id = payload.scanner_id.as_deref().unwrap_or("-"), "Admitted guest pass {}", pass.id);

    Ok(Json(ScanResponse { admitted: true, pass: pass.into() }))
}
