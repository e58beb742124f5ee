use crate::domain::models::{guest_pass::GuestPass, nonce_ledger::NonceLedgerEntry};
use crate::domain::services::qr_rotation::Rotation;
use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// RSVP details written when a pending pass is confirmed.
#[derive(Debug, Clone, Default)]
pub struct RsvpDetails {
    pub guest_name: Option<String>,
    pub guest_email: Option<String>,
    pub payment_reference: Option<String>,
}

/// Every status change is a conditional write: it only applies when the
/// stored row still satisfies the precondition, and reports whether it did.
#[async_trait]
pub trait GuestPassRepository: Send + Sync {
    async fn create(&self, pass: &GuestPass) -> Result<GuestPass, AppError>;
    async fn find_by_id(&self, id: &str) -> Result<Option<GuestPass>, AppError>;
    async fn find_by_token_hash(&self, token_hash: &str) -> Result<Option<GuestPass>, AppError>;
    async fn list_by_event(&self, event_id: &str) -> Result<Vec<GuestPass>, AppError>;

    /// Stores RSVP details on a pending pass without activating it.
    async fn record_rsvp(&self, id: &str, details: &RsvpDetails, now: DateTime<Utc>) -> Result<bool, AppError>;
    /// `pending -> active` with a fresh secret, only while `expires_at > now`.
    async fn activate(&self, id: &str, details: &RsvpDetails, rotation: &Rotation, now: DateTime<Utc>) -> Result<bool, AppError>;
    /// Swaps the secret of an active pass and retires the previous one.
    async fn rotate_secret(&self, id: &str, rotation: &Rotation, now: DateTime<Utc>) -> Result<bool, AppError>;
    /// `active -> used`, only while the stored secret still equals `secret`.
    async fn consume(&self, id: &str, secret: &str, now: DateTime<Utc>) -> Result<bool, AppError>;
    /// `pending|active -> revoked`.
    async fn revoke(&self, id: &str, now: DateTime<Utc>) -> Result<bool, AppError>;
    /// `pending|active -> expired` for a single pass whose cutoff has passed.
    async fn expire(&self, id: &str, now: DateTime<Utc>) -> Result<bool, AppError>;
    /// `pending|active -> expired` for every pass with `expires_at < now`.
    async fn expire_due(&self, now: DateTime<Utc>) -> Result<u64, AppError>;

    async fn find_due_for_rotation(&self, generated_before: DateTime<Utc>, limit: i64) -> Result<Vec<GuestPass>, AppError>;
    async fn find_retired_nonce(&self, pass_id: &str, nonce_hash: &str) -> Result<Option<NonceLedgerEntry>, AppError>;
}
