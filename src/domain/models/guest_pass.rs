use chrono::{DateTime, Duration, DurationRound, TimeDelta, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::services::qr_rotation::generate_secret;

pub const TOKEN_LENGTH: usize = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PassStatus {
    Pending,
    Active,
    Used,
    Expired,
    Revoked,
}

#[derive(Debug, Error)]
#[error("unknown guest pass status: {0}")]
pub struct UnknownStatus(String);

impl PassStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PassStatus::Pending => "pending",
            PassStatus::Active => "active",
            PassStatus::Used => "used",
            PassStatus::Expired => "expired",
            PassStatus::Revoked => "revoked",
        }
    }

    /// `used`, `expired` and `revoked` are absorbing.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PassStatus::Used | PassStatus::Expired | PassStatus::Revoked)
    }

    pub fn can_transition_to(&self, next: PassStatus) -> bool {
        use PassStatus::*;
        matches!(
            (self, next),
            (Pending, Active) | (Active, Used) | (Pending | Active, Expired) | (Pending | Active, Revoked)
        )
    }
}

impl fmt::Display for PassStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PassStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PassStatus::Pending),
            "active" => Ok(PassStatus::Active),
            "used" => Ok(PassStatus::Used),
            "expired" => Ok(PassStatus::Expired),
            "revoked" => Ok(PassStatus::Revoked),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

impl TryFrom<String> for PassStatus {
    type Error = UnknownStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CoverCharge {
    pub enabled: bool,
    pub amount_cents: i64,
    pub currency: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct GuestPass {
    pub id: String,
    pub event_id: String,
    pub token_hash: String,
    #[sqlx(try_from = "String")]
    pub status: PassStatus,
    pub qr_secret: String,
    pub qr_generated_at: DateTime<Utc>,
    pub event_start_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub cover_charge_enabled: bool,
    pub cover_charge_amount_cents: Option<i64>,
    pub cover_charge_currency: Option<String>,
    pub guest_name: Option<String>,
    pub guest_email: Option<String>,
    pub payment_reference: Option<String>,
    pub rsvp_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
}

pub struct NewGuestPassParams {
    pub event_id: String,
    pub event_start_at: DateTime<Utc>,
    pub expiry_hours: i64,
    pub cover_charge: Option<CoverCharge>,
}

/// Cutoff after which a pass can no longer be redeemed.
pub fn compute_expires_at(event_start_at: DateTime<Utc>, expiry_hours: i64) -> DateTime<Utc> {
    event_start_at - Duration::hours(expiry_hours)
}

/// Microsecond precision survives a round trip through both backends.
pub fn truncate_timestamp(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.duration_trunc(TimeDelta::microseconds(1)).unwrap_or(ts)
}

impl GuestPass {
    /// Builds a pending pass and returns it along with the raw invitation token.
    /// Only the token's digest is kept on the pass.
    pub fn new(params: NewGuestPassParams) -> (Self, String) {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LENGTH)
            .map(char::from)
            .collect();

        let now = truncate_timestamp(Utc::now());
        let event_start_at = truncate_timestamp(params.event_start_at);
        let cover = params.cover_charge.filter(|c| c.enabled);

        let pass = Self {
            id: Uuid::new_v4().to_string(),
            event_id: params.event_id,
            token_hash: hash_token(&token),
            status: PassStatus::Pending,
            qr_secret: generate_secret(),
            qr_generated_at: now,
            event_start_at,
            expires_at: compute_expires_at(event_start_at, params.expiry_hours),
            cover_charge_enabled: cover.is_some(),
            cover_charge_amount_cents: cover.as_ref().map(|c| c.amount_cents),
            cover_charge_currency: cover.map(|c| c.currency),
            guest_name: None,
            guest_email: None,
            payment_reference: None,
            rsvp_at: None,
            created_at: now,
            used_at: None,
            revoked_at: None,
        };

        (pass, token)
    }

    pub fn cover_charge(&self) -> Option<CoverCharge> {
        if !self.cover_charge_enabled {
            return None;
        }
        Some(CoverCharge {
            enabled: true,
            amount_cents: self.cover_charge_amount_cents.unwrap_or_default(),
            currency: self.cover_charge_currency.clone().unwrap_or_default(),
        })
    }

    pub fn is_past_cutoff(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Activation needs payment confirmation when a cover charge applies.
    pub fn requires_payment(&self, payment_reference: Option<&str>) -> bool {
        self.cover_charge_enabled && payment_reference.map_or(true, |r| r.trim().is_empty())
    }

    /// Error describing why this pass cannot be redeemed, if any.
    pub fn redemption_blocker(&self, now: DateTime<Utc>) -> Option<crate::error::AppError> {
        use crate::error::AppError;
        match self.status {
            PassStatus::Used => Some(AppError::AlreadyUsed),
            PassStatus::Expired => Some(AppError::Expired),
            PassStatus::Revoked => Some(AppError::Revoked),
            PassStatus::Pending | PassStatus::Active if self.is_past_cutoff(now) => Some(AppError::Expired),
            PassStatus::Pending => Some(AppError::NotActive),
            PassStatus::Active => None,
        }
    }
}

pub fn hash_token(token: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
