use crate::domain::models::guest_pass::{CoverCharge, GuestPass, PassStatus};
use crate::domain::services::guest_pass_service::QrDisplay;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Public view of a pass. Never carries the QR secret or token digest.
#[derive(Serialize)]
pub struct GuestPassView {
    pub id: String,
    pub event_id: String,
    pub status: PassStatus,
    pub expires_at: DateTime<Utc>,
    pub cover_charge: Option<CoverCharge>,
    pub guest_name: Option<String>,
    pub rsvp_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

impl From<GuestPass> for GuestPassView {
    fn from(pass: GuestPass) -> Self {
        Self {
            cover_charge: pass.cover_charge(),
            id: pass.id,
            event_id: pass.event_id,
            status: pass.status,
            expires_at: pass.expires_at,
            guest_name: pass.guest_name,
            rsvp_at: pass.rsvp_at,
            created_at: pass.created_at,
            used_at: pass.used_at,
        }
    }
}

#[derive(Serialize)]
pub struct GuestPassCreatedResponse {
    pub token: String,
    pub pass: GuestPassView,
}

#[derive(Serialize)]
pub struct RsvpResponse {
    pub payment_required: bool,
    pub pass: GuestPassView,
}

#[derive(Serialize)]
pub struct QrResponse {
    pub payload: String,
    pub nonce: String,
    pub generated_at: DateTime<Utc>,
    pub rotates_in_secs: i64,
}

impl From<QrDisplay> for QrResponse {
    fn from(qr: QrDisplay) -> Self {
        Self {
            payload: qr.payload,
            nonce: qr.nonce,
            generated_at: qr.generated_at,
            rotates_in_secs: qr.rotates_in_secs,
        }
    }
}

#[derive(Serialize)]
pub struct ScanResponse {
    pub admitted: bool,
    pub pass: GuestPassView,
}
