use axum::{extract::{rejection::JsonRejection, State, Path}, http::StatusCode, response::IntoResponse, Json};
use crate::state::AppState;
use crate::api::extractors::host_auth::HostAuth;
use crate::api::dtos::{requests::CreateGuestPassRequest, responses::{GuestPassCreatedResponse, GuestPassView}};
use crate::domain::services::guest_pass_service::CreatePassCommand;
use crate::error::AppError;
use std::sync::Arc;
use tracing::info;

pub async fn create_guest_pass(
    State(state): State<Arc<AppState>>,
    _host: HostAuth,
    payload: Result<Json<CreateGuestPassRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(payload) = payload.map_err(|e| AppError::Validation(format!("Malformed guest pass request: {}", e.body_text())))?;

    let issued = state.guest_pass_service.create(CreatePassCommand {
        event_id: payload.event_id,
        event_start_at: payload.event_start_time,
        expiry_hours: payload.guest_pass_expiry_hours,
        cover_charge: payload.cover_charge,
    }).await?;

    let response = GuestPassCreatedResponse {
        token: issued.token,
        pass: issued.pass.into(),
    };
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn list_event_passes(
    State(state): State<Arc<AppState>>,
    _host: HostAuth,
    Path(event_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let passes = state.guest_pass_service.list_for_event(&event_id).await?;
    let views: Vec<GuestPassView> = passes.into_iter().map(Into::into).collect();
    Ok(Json(views))
}

pub async fn revoke_guest_pass(
    State(state): State<Arc<AppState>>,
    _host: HostAuth,
    Path(pass_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let revoked = state.guest_pass_service.revoke(&pass_id).await?;
    info!("Host revoked guest pass {}", revoked.id);
    Ok(Json(GuestPassView::from(revoked)))
}
