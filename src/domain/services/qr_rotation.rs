//! Periodic regeneration of the secret behind a pass's QR code.
//!
//! A rendered QR code stays redeemable for one rotation interval at most.
//! When a rotation cannot be persisted the pass keeps its last secret, which
//! is still unguessable, and the next sweep tries again.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::{rngs::OsRng, RngCore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::models::guest_pass::{truncate_timestamp, GuestPass, PassStatus};
use crate::domain::ports::GuestPassRepository;
use crate::domain::services::nonce_verifier::nonce_digest;
use crate::domain::services::with_store_timeout;
use crate::error::AppError;

/// 256 bits.
pub const SECRET_BYTES: usize = 32;

const MAX_GENERATION_ATTEMPTS: usize = 3;

pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rotation {
    pub previous_secret: String,
    pub next_secret: String,
    pub generated_at: DateTime<Utc>,
}

/// `generated_at` is strictly later than the pass's current one even when the
/// clock has not advanced.
pub fn plan_rotation(pass: &GuestPass, now: DateTime<Utc>) -> Rotation {
    let mut next_secret = generate_secret();
    while next_secret == pass.qr_secret {
        next_secret = generate_secret();
    }

    let floor = pass.qr_generated_at + ChronoDuration::microseconds(1);
    let generated_at = truncate_timestamp(now).max(floor);

    Rotation {
        previous_secret: pass.qr_secret.clone(),
        next_secret,
        generated_at,
    }
}

impl GuestPass {
    pub fn apply_rotation(&mut self, rotation: &Rotation) {
        self.qr_secret = rotation.next_secret.clone();
        self.qr_generated_at = rotation.generated_at;
    }
}

pub struct QrRotationEngine {
    repo: Arc<dyn GuestPassRepository>,
    interval: Duration,
    store_timeout: Duration,
}

impl QrRotationEngine {
    pub fn new(repo: Arc<dyn GuestPassRepository>, interval: Duration, store_timeout: Duration) -> Self {
        Self { repo, interval, store_timeout }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn interval_delta(&self) -> ChronoDuration {
        ChronoDuration::from_std(self.interval).unwrap_or(ChronoDuration::seconds(30))
    }

    pub fn is_stale(&self, pass: &GuestPass, now: DateTime<Utc>) -> bool {
        now - pass.qr_generated_at >= self.interval_delta()
    }

    /// Seconds left before the displayed secret is due for rotation.
    pub fn seconds_remaining(&self, pass: &GuestPass, now: DateTime<Utc>) -> i64 {
        let due = pass.qr_generated_at + self.interval_delta();
        (due - now).num_seconds().max(0)
    }

    /// Replaces the secret of an active pass. A concurrent rotation wins over
    /// this one; the freshly stored pass is returned in that case.
    pub async fn rotate(&self, pass: &GuestPass) -> Result<GuestPass, AppError> {
        if pass.status != PassStatus::Active {
            return Err(AppError::NotActive);
        }

        let rotation = self.plan_unused_rotation(pass).await?;
        let applied = with_store_timeout(
            self.store_timeout,
            self.repo.rotate_secret(&pass.id, &rotation, Utc::now()),
        )
        .await?;

        if applied {
            debug!(pass_id = %pass.id, "Rotated QR secret");
            let mut rotated = pass.clone();
            rotated.apply_rotation(&rotation);
            return Ok(rotated);
        }

        with_store_timeout(self.store_timeout, self.repo.find_by_id(&pass.id))
            .await?
            .ok_or(AppError::NotFound("Guest pass not found".into()))
    }

    async fn plan_unused_rotation(&self, pass: &GuestPass) -> Result<Rotation, AppError> {
        for _ in 0..MAX_GENERATION_ATTEMPTS {
            let rotation = plan_rotation(pass, Utc::now());
            let digest = nonce_digest(&rotation.next_secret);
            let seen = with_store_timeout(self.store_timeout, self.repo.find_retired_nonce(&pass.id, &digest)).await?;
            if seen.is_none() {
                return Ok(rotation);
            }
            warn!(pass_id = %pass.id, "Generated QR secret collided with a retired one, regenerating");
        }
        Err(AppError::Internal)
    }

    /// Rotates a stale secret before it is displayed. Falls back to the stored
    /// secret if the rotation cannot be persisted.
    pub async fn refresh_if_stale(&self, pass: GuestPass) -> GuestPass {
        if pass.status != PassStatus::Active || !self.is_stale(&pass, Utc::now()) {
            return pass;
        }
        match self.rotate(&pass).await {
            Ok(rotated) => rotated,
            Err(e) => {
                warn!(pass_id = %pass.id, error = %e, "Lazy QR rotation failed, serving last secret");
                pass
            }
        }
    }

    /// Rotates every active pass whose secret has outlived the interval.
    /// Returns how many were rotated.
    pub async fn rotate_due(&self, batch_size: i64) -> Result<usize, AppError> {
        let cutoff = Utc::now() - self.interval_delta();
        let due = with_store_timeout(self.store_timeout, self.repo.find_due_for_rotation(cutoff, batch_size)).await?;

        let mut rotated = 0;
        for pass in due {
            match self.rotate(&pass).await {
                Ok(_) => rotated += 1,
                Err(e) => warn!(pass_id = %pass.id, error = %e, "QR rotation failed, keeping last secret"),
            }
        }
        Ok(rotated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::guest_pass::NewGuestPassParams;
    use std::collections::HashSet;

    fn active_pass() -> GuestPass {
        let (mut pass, _) = GuestPass::new(NewGuestPassParams {
            event_id: "evt".into(),
            event_start_at: Utc::now() + ChronoDuration::hours(8),
            expiry_hours: 4,
            cover_charge: None,
        });
        pass.status = PassStatus::Active;
        pass
    }

    #[test]
    fn secrets_carry_256_bits() {
        let secret = generate_secret();
        assert_eq!(secret.len(), SECRET_BYTES * 2);
        assert_eq!(hex::decode(&secret).unwrap().len(), SECRET_BYTES);
    }

    #[test]
    fn thousand_rotations_never_repeat_and_move_forward() {
        let mut pass = active_pass();
        let mut seen = HashSet::new();
        seen.insert(pass.qr_secret.clone());
        let fixed_now = pass.qr_generated_at;

        for i in 0..1000 {
            let before = pass.qr_generated_at;
            // Half the rotations run with a frozen clock.
            let now = if i % 2 == 0 { fixed_now } else { Utc::now() };
            let rotation = plan_rotation(&pass, now);
            assert_eq!(rotation.previous_secret, pass.qr_secret);
            pass.apply_rotation(&rotation);

            assert!(seen.insert(pass.qr_secret.clone()), "secret repeated at rotation {i}");
            assert!(pass.qr_generated_at > before, "timestamp not increasing at rotation {i}");
        }
        assert_eq!(seen.len(), 1001);
    }
}
