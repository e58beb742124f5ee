use crate::domain::models::guest_pass::CoverCharge;
use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Deserialize)]
pub struct CreateGuestPassRequest {
    pub event_id: String,
    pub event_start_time: DateTime<Utc>,
    pub guest_pass_expiry_hours: Option<i64>,
    pub cover_charge: Option<CoverCharge>,
}

#[derive(Deserialize, Default)]
pub struct RsvpRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub payment_reference: Option<String>,
}

/// Body posted by a door scanner: either the full QR `code`, the bare
/// `nonce`, or both. Values stay loosely typed so that non-strings are
/// reported as a format failure.
#[derive(Deserialize)]
pub struct ScanRequest {
    pub code: Option<serde_json::Value>,
    pub nonce: Option<serde_json::Value>,
    pub scanner_id: Option<String>,
}
