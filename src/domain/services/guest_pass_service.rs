use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::domain::models::guest_pass::{hash_token, CoverCharge, GuestPass, NewGuestPassParams, PassStatus};
use crate::domain::models::nonce_ledger::RetireReason;
use crate::domain::ports::{GuestPassRepository, RsvpDetails};
use crate::domain::services::nonce_verifier::{nonce_digest, verify_hex_nonce};
use crate::domain::services::qr_rotation::{plan_rotation, QrRotationEngine, SECRET_BYTES};
use crate::domain::services::token_validator::{validate_nonce, validate_token};
use crate::domain::services::with_store_timeout;
use crate::error::AppError;

pub const QR_PAYLOAD_PREFIX: &str = "gp1";
const MAX_EXPIRY_HOURS: i64 = 24 * 30;
const MAX_FIELD_LENGTH: usize = 256;

pub struct CreatePassCommand {
    pub event_id: String,
    pub event_start_at: DateTime<Utc>,
    pub expiry_hours: Option<i64>,
    pub cover_charge: Option<CoverCharge>,
}

pub struct IssuedPass {
    pub pass: GuestPass,
    pub token: String,
}

pub enum RsvpOutcome {
    Activated(GuestPass),
    AwaitingPayment(GuestPass),
}

pub struct QrDisplay {
    pub payload: String,
    pub nonce: String,
    pub generated_at: DateTime<Utc>,
    pub rotates_in_secs: i64,
}

pub struct GuestPassService {
    repo: Arc<dyn GuestPassRepository>,
    rotation: Arc<QrRotationEngine>,
    default_expiry_hours: i64,
    store_timeout: Duration,
}

impl GuestPassService {
    pub fn new(
        repo: Arc<dyn GuestPassRepository>,
        rotation: Arc<QrRotationEngine>,
        default_expiry_hours: i64,
        store_timeout: Duration,
    ) -> Self {
        Self { repo, rotation, default_expiry_hours, store_timeout }
    }

    pub async fn create(&self, cmd: CreatePassCommand) -> Result<IssuedPass, AppError> {
        let event_id = cmd.event_id.trim();
        if event_id.is_empty() || event_id.len() > MAX_FIELD_LENGTH {
            return Err(AppError::Validation("event_id must be between 1 and 256 characters".into()));
        }

        let expiry_hours = cmd.expiry_hours.unwrap_or(self.default_expiry_hours);
        if !(0..=MAX_EXPIRY_HOURS).contains(&expiry_hours) {
            return Err(AppError::Validation(format!("expiry_hours must be between 0 and {MAX_EXPIRY_HOURS}")));
        }

        if let Some(cover) = cmd.cover_charge.as_ref().filter(|c| c.enabled) {
            if cover.amount_cents <= 0 {
                return Err(AppError::Validation("cover charge amount must be positive".into()));
            }
            if cover.currency.len() != 3 || !cover.currency.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(AppError::Validation("cover charge currency must be an ISO 4217 code".into()));
            }
        }

        let (pass, token) = GuestPass::new(NewGuestPassParams {
            event_id: event_id.to_string(),
            event_start_at: cmd.event_start_at,
            expiry_hours,
            cover_charge: cmd.cover_charge.map(|mut c| {
                c.currency = c.currency.to_ascii_uppercase();
                c
            }),
        });

        let created = self.store(self.repo.create(&pass)).await?;
        info!(pass_id = %created.id, event_id = %created.event_id, "Issued guest pass");

        Ok(IssuedPass { pass: created, token })
    }

    pub async fn find_by_token(&self, token: &str) -> Result<GuestPass, AppError> {
        let token = validate_token(token)?;
        self.store(self.repo.find_by_token_hash(&hash_token(token)))
            .await?
            .ok_or(AppError::NotFound("Guest pass not found".into()))
    }

    pub async fn list_for_event(&self, event_id: &str) -> Result<Vec<GuestPass>, AppError> {
        self.store(self.repo.list_by_event(event_id)).await
    }

    pub async fn rsvp(&self, token: &str, details: RsvpDetails) -> Result<RsvpOutcome, AppError> {
        let details = sanitize_details(details)?;
        let pass = self.find_by_token(token).await?;
        let now = Utc::now();

        match pass.status {
            PassStatus::Used => return Err(AppError::AlreadyUsed),
            PassStatus::Expired => return Err(AppError::Expired),
            PassStatus::Revoked => return Err(AppError::Revoked),
            PassStatus::Active => return Ok(RsvpOutcome::Activated(pass)),
            PassStatus::Pending => {}
        }

        if pass.is_past_cutoff(now) {
            return Err(self.expire_lazily(&pass, now).await);
        }

        if pass.requires_payment(details.payment_reference.as_deref()) {
            if !self.store(self.repo.record_rsvp(&pass.id, &details, now)).await? {
                return Err(self.conflict_for(&pass.id).await);
            }
            info!(pass_id = %pass.id, "RSVP recorded, awaiting payment");
            let refreshed = self.reload(&pass.id).await?;
            return Ok(RsvpOutcome::AwaitingPayment(refreshed));
        }

        let rotation = plan_rotation(&pass, now);
        if !self.store(self.repo.activate(&pass.id, &details, &rotation, now)).await? {
            // A concurrent RSVP activating the pass counts as success.
            let current = self.reload(&pass.id).await?;
            if current.status == PassStatus::Active {
                return Ok(RsvpOutcome::Activated(current));
            }
            return Err(status_error(current.status));
        }

        info!(pass_id = %pass.id, "Guest pass activated");
        Ok(RsvpOutcome::Activated(self.reload(&pass.id).await?))
    }

    pub async fn qr(&self, token: &str) -> Result<QrDisplay, AppError> {
        let pass = self.find_by_token(token).await?;
        let now = Utc::now();
        if let Some(err) = pass.redemption_blocker(now) {
            return Err(self.settle_blocker(&pass, err, now).await);
        }

        let pass = self.rotation.refresh_if_stale(pass).await;
        Ok(QrDisplay {
            payload: format!("{QR_PAYLOAD_PREFIX}.{token}.{}", pass.qr_secret),
            rotates_in_secs: self.rotation.seconds_remaining(&pass, Utc::now()),
            generated_at: pass.qr_generated_at,
            nonce: pass.qr_secret,
        })
    }

    /// Validates a door scan and consumes the pass. At most one scan of a
    /// given pass ever succeeds.
    pub async fn scan(&self, token: &str, nonce: &str) -> Result<GuestPass, AppError> {
        validate_token(token)?;
        let nonce = validate_nonce(nonce, SECRET_BYTES)?;

        let pass = self.find_by_token(token).await?;
        let now = Utc::now();
        if let Some(err) = pass.redemption_blocker(now) {
            return Err(self.settle_blocker(&pass, err, now).await);
        }

        if !verify_hex_nonce(&pass.qr_secret, nonce) {
            return Err(self.classify_mismatch(&pass, nonce, now).await);
        }

        if !self.store(self.repo.consume(&pass.id, &pass.qr_secret, now)).await? {
            let err = self.conflict_for(&pass.id).await;
            if matches!(err, AppError::NotActive) {
                // Still active, so the secret rotated between read and write.
                return Err(AppError::InvalidOrExpiredToken);
            }
            return Err(err);
        }

        info!(pass_id = %pass.id, event_id = %pass.event_id, "Guest pass checked in");
        self.reload(&pass.id).await
    }

    pub async fn revoke(&self, pass_id: &str) -> Result<GuestPass, AppError> {
        let pass = self.reload(pass_id).await?;
        match pass.status {
            PassStatus::Revoked => return Ok(pass),
            PassStatus::Used => return Err(AppError::AlreadyUsed),
            PassStatus::Expired => return Err(AppError::Expired),
            PassStatus::Pending | PassStatus::Active => {}
        }

        if !self.store(self.repo.revoke(pass_id, Utc::now())).await? {
            let refreshed = self.reload(pass_id).await?;
            if refreshed.status == PassStatus::Revoked {
                return Ok(refreshed);
            }
            return Err(status_error(refreshed.status));
        }

        info!(pass_id, "Guest pass revoked by host");
        self.reload(pass_id).await
    }

    async fn classify_mismatch(&self, pass: &GuestPass, nonce: &str, now: DateTime<Utc>) -> AppError {
        let retired = self.store(self.repo.find_retired_nonce(&pass.id, &nonce_digest(nonce))).await;
        let grace = ChronoDuration::from_std(self.rotation.interval()).unwrap_or(ChronoDuration::seconds(30));

        match retired {
            Ok(Some(entry)) if entry.reason() == Some(RetireReason::Rotated) && now - entry.retired_at <= grace => {
                AppError::InvalidOrExpiredToken
            }
            Ok(_) => {
                warn!(pass_id = %pass.id, event_id = %pass.event_id, "Replay or forged scan payload rejected");
                AppError::ReplayDetected
            }
            Err(e) => e,
        }
    }

    async fn settle_blocker(&self, pass: &GuestPass, err: AppError, now: DateTime<Utc>) -> AppError {
        if matches!(err, AppError::Expired) && !pass.status.is_terminal() {
            return self.expire_lazily(pass, now).await;
        }
        err
    }

    async fn expire_lazily(&self, pass: &GuestPass, now: DateTime<Utc>) -> AppError {
        match self.store(self.repo.expire(&pass.id, now)).await {
            Ok(true) => {
                info!(pass_id = %pass.id, "Guest pass expired on access");
                AppError::Expired
            }
            Ok(false) => self.conflict_for(&pass.id).await,
            Err(e) => e,
        }
    }

    /// Explains why a conditional write did not apply.
    async fn conflict_for(&self, pass_id: &str) -> AppError {
        match self.reload(pass_id).await {
            Ok(pass) => status_error(pass.status),
            Err(e) => e,
        }
    }

    async fn reload(&self, pass_id: &str) -> Result<GuestPass, AppError> {
        self.store(self.repo.find_by_id(pass_id))
            .await?
            .ok_or(AppError::NotFound("Guest pass not found".into()))
    }

    async fn store<T>(&self, fut: impl std::future::Future<Output = Result<T, AppError>>) -> Result<T, AppError> {
        with_store_timeout(self.store_timeout, fut).await
    }
}

/// Splits a displayed QR payload (`gp1.<token>.<nonce>`) into token and nonce.
pub fn parse_qr_payload(code: &str) -> Result<(&str, &str), AppError> {
    let code = validate_token(code)?;
    let mut parts = code.splitn(3, '.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(QR_PAYLOAD_PREFIX), Some(token), Some(nonce)) if !token.is_empty() && !nonce.is_empty() => Ok((token, nonce)),
        _ => Err(AppError::InvalidFormat),
    }
}

fn status_error(status: PassStatus) -> AppError {
    match status {
        PassStatus::Used => AppError::AlreadyUsed,
        PassStatus::Expired => AppError::Expired,
        PassStatus::Revoked => AppError::Revoked,
        PassStatus::Pending | PassStatus::Active => AppError::NotActive,
    }
}

fn sanitize_details(details: RsvpDetails) -> Result<RsvpDetails, AppError> {
    fn clean(field: &str, value: Option<String>) -> Result<Option<String>, AppError> {
        let Some(value) = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) else {
            return Ok(None);
        };
        if value.len() > MAX_FIELD_LENGTH || value.chars().any(|c| c.is_control() || c == '<' || c == '>') {
            return Err(AppError::Validation(format!("{field} is invalid")));
        }
        Ok(Some(value))
    }

    let guest_email = clean("guest_email", details.guest_email)?;
    if guest_email.as_deref().is_some_and(|e| !e.contains('@')) {
        return Err(AppError::Validation("guest_email is invalid".into()));
    }

    Ok(RsvpDetails {
        guest_name: clean("guest_name", details.guest_name)?,
        guest_email,
        payment_reference: clean("payment_reference", details.payment_reference)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qr_payload_splits_into_token_and_nonce() {
        let nonce = "ab".repeat(32);
        let code = format!("gp1.Zq8xkP0aLm3nB7vC1dE4.{nonce}");
        assert_eq!(parse_qr_payload(&code).unwrap(), ("Zq8xkP0aLm3nB7vC1dE4", nonce.as_str()));
        assert!(matches!(parse_qr_payload("gp2.abcdefghij.0011"), Err(AppError::InvalidFormat)));
        assert!(matches!(parse_qr_payload("gp1.abcdefghijkl"), Err(AppError::InvalidFormat)));
        assert!(matches!(parse_qr_payload("<script>gp1.a.b"), Err(AppError::InvalidFormat)));
    }

    #[test]
    fn details_are_trimmed_and_blank_fields_dropped() {
        let details = sanitize_details(RsvpDetails {
            guest_name: Some("  Ada  ".into()),
            guest_email: Some("   ".into()),
            payment_reference: Some("pi_42".into()),
        })
        .unwrap();
        assert_eq!(details.guest_name.as_deref(), Some("Ada"));
        assert!(details.guest_email.is_none());
        assert_eq!(details.payment_reference.as_deref(), Some("pi_42"));
    }

    #[test]
    fn markup_in_details_is_rejected() {
        let result = sanitize_details(RsvpDetails {
            guest_name: Some("<b>Ada</b>".into()),
            ..Default::default()
        });
        assert!(matches!(result, Err(AppError::Validation(_))));
        let result = sanitize_details(RsvpDetails {
            guest_email: Some("not-an-email".into()),
            ..Default::default()
        });
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn stored_status_maps_to_conflict_error() {
        assert!(matches!(status_error(PassStatus::Used), AppError::AlreadyUsed));
        assert!(matches!(status_error(PassStatus::Expired), AppError::Expired));
        assert!(matches!(status_error(PassStatus::Revoked), AppError::Revoked));
        assert!(matches!(status_error(PassStatus::Pending), AppError::NotActive));
    }
}
