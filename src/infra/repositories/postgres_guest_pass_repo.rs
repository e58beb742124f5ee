use crate::domain::models::{guest_pass::GuestPass, nonce_ledger::{NonceLedgerEntry, RetireReason}};
use crate::domain::ports::{GuestPassRepository, RsvpDetails};
use crate::domain::services::nonce_verifier::nonce_digest;
use crate::domain::services::qr_rotation::Rotation;
use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

pub struct PostgresGuestPassRepo {
    pool: PgPool,
}

impl PostgresGuestPassRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const RETIRE_NONCE: &str =
    "INSERT INTO guest_pass_nonces (pass_id, nonce_hash, reason, retired_at) VALUES ($1, $2, $3, $4) ON CONFLICT (pass_id, nonce_hash) DO NOTHING";

#[async_trait]
impl GuestPassRepository for PostgresGuestPassRepo {
    async fn create(&self, pass: &GuestPass) -> Result<GuestPass, AppError> {
        sqlx::query_as::<_, GuestPass>(
            "INSERT INTO guest_passes (id, event_id, token_hash, status, qr_secret, qr_generated_at, event_start_at, expires_at,
                cover_charge_enabled, cover_charge_amount_cents, cover_charge_currency, guest_name, guest_email, payment_reference,
                rsvp_at, created_at, used_at, revoked_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
             RETURNING *"
        )
            .bind(&pass.id).bind(&pass.event_id).bind(&pass.token_hash).bind(pass.status.as_str())
            .bind(&pass.qr_secret).bind(pass.qr_generated_at).bind(pass.event_start_at).bind(pass.expires_at)
            .bind(pass.cover_charge_enabled).bind(pass.cover_charge_amount_cents).bind(&pass.cover_charge_currency)
            .bind(&pass.guest_name).bind(&pass.guest_email).bind(&pass.payment_reference)
            .bind(pass.rsvp_at).bind(pass.created_at).bind(pass.used_at).bind(pass.revoked_at)
            .fetch_one(&self.pool).await.map_err(AppError::Database)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<GuestPass>, AppError> {
        sqlx::query_as::<_, GuestPass>("SELECT * FROM guest_passes WHERE id = $1")
            .bind(id).fetch_optional(&self.pool).await.map_err(AppError::Database)
    }

    async fn find_by_token_hash(&self, token_hash: &str) -> Result<Option<GuestPass>, AppError> {
        sqlx::query_as::<_, GuestPass>("SELECT * FROM guest_passes WHERE token_hash = $1")
            .bind(token_hash).fetch_optional(&self.pool).await.map_err(AppError::Database)
    }

    async fn list_by_event(&self, event_id: &str) -> Result<Vec<GuestPass>, AppError> {
        sqlx::query_as::<_, GuestPass>("SELECT * FROM guest_passes WHERE event_id = $1 ORDER BY created_at ASC")
            .bind(event_id).fetch_all(&self.pool).await.map_err(AppError::Database)
    }

    async fn record_rsvp(&self, id: &str, details: &RsvpDetails, now: DateTime<Utc>) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE guest_passes SET guest_name = $1, guest_email = $2, payment_reference = $3, rsvp_at = $4
             WHERE id = $5 AND status = 'pending' AND expires_at > $6"
        )
            .bind(&details.guest_name).bind(&details.guest_email).bind(&details.payment_reference).bind(now)
            .bind(id).bind(now)
            .execute(&self.pool).await.map_err(AppError::Database)?;
        Ok(result.rows_affected() == 1)
    }

    async fn activate(&self, id: &str, details: &RsvpDetails, rotation: &Rotation, now: DateTime<Utc>) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        let result = sqlx::query(
            "UPDATE guest_passes SET status = 'active', qr_secret = $1, qr_generated_at = $2,
                guest_name = $3, guest_email = $4, payment_reference = $5, rsvp_at = $6
             WHERE id = $7 AND status = 'pending' AND qr_secret = $8 AND expires_at > $9"
        )
            .bind(&rotation.next_secret).bind(rotation.generated_at)
            .bind(&details.guest_name).bind(&details.guest_email).bind(&details.payment_reference).bind(now)
            .bind(id).bind(&rotation.previous_secret).bind(now)
            .execute(&mut *tx).await.map_err(AppError::Database)?;
        if result.rows_affected() == 0 { return Ok(false); }

        sqlx::query(RETIRE_NONCE)
            .bind(id).bind(nonce_digest(&rotation.previous_secret)).bind(RetireReason::Rotated.as_str()).bind(now)
            .execute(&mut *tx).await.map_err(AppError::Database)?;
        tx.commit().await.map_err(AppError::Database)?;
        Ok(true)
    }

    async fn rotate_secret(&self, id: &str, rotation: &Rotation, now: DateTime<Utc>) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        let result = sqlx::query(
            "UPDATE guest_passes SET qr_secret = $1, qr_generated_at = $2 WHERE id = $3 AND status = 'active' AND qr_secret = $4"
        )
            .bind(&rotation.next_secret).bind(rotation.generated_at).bind(id).bind(&rotation.previous_secret)
            .execute(&mut *tx).await.map_err(AppError::Database)?;
        if result.rows_affected() == 0 { return Ok(false); }

        sqlx::query(RETIRE_NONCE)
            .bind(id).bind(nonce_digest(&rotation.previous_secret)).bind(RetireReason::Rotated.as_str()).bind(now)
            .execute(&mut *tx).await.map_err(AppError::Database)?;
        tx.commit().await.map_err(AppError::Database)?;
        Ok(true)
    }

    async fn consume(&self, id: &str, secret: &str, now: DateTime<Utc>) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        let result = sqlx::query(
            "UPDATE guest_passes SET status = 'used', used_at = $1 WHERE id = $2 AND status = 'active' AND qr_secret = $3 AND expires_at > $4"
        )
            .bind(now).bind(id).bind(secret).bind(now)
            .execute(&mut *tx).await.map_err(AppError::Database)?;
        if result.rows_affected() == 0 { return Ok(false); }

        sqlx::query(RETIRE_NONCE)
            .bind(id).bind(nonce_digest(secret)).bind(RetireReason::Consumed.as_str()).bind(now)
            .execute(&mut *tx).await.map_err(AppError::Database)?;
        tx.commit().await.map_err(AppError::Database)?;
        Ok(true)
    }

    async fn revoke(&self, id: &str, now: DateTime<Utc>) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE guest_passes SET status = 'revoked', revoked_at = $1 WHERE id = $2 AND status IN ('pending', 'active')")
            .bind(now).bind(id).execute(&self.pool).await.map_err(AppError::Database)?;
        Ok(result.rows_affected() == 1)
    }

    async fn expire(&self, id: &str, now: DateTime<Utc>) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE guest_passes SET status = 'expired' WHERE id = $1 AND status IN ('pending', 'active') AND expires_at <= $2")
            .bind(id).bind(now).execute(&self.pool).await.map_err(AppError::Database)?;
        Ok(result.rows_affected() == 1)
    }

    async fn expire_due(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("UPDATE guest_passes SET status = 'expired' WHERE status IN ('pending', 'active') AND expires_at < $1")
            .bind(now).execute(&self.pool).await.map_err(AppError::Database)?;
        Ok(result.rows_affected())
    }

    async fn find_due_for_rotation(&self, generated_before: DateTime<Utc>, limit: i64) -> Result<Vec<GuestPass>, AppError> {
        sqlx::query_as::<_, GuestPass>(
            "SELECT * FROM guest_passes WHERE status = 'active' AND qr_generated_at <= $1 ORDER BY qr_generated_at ASC LIMIT $2"
        )
            .bind(generated_before).bind(limit)
            .fetch_all(&self.pool).await.map_err(AppError::Database)
    }

    async fn find_retired_nonce(&self, pass_id: &str, nonce_hash: &str) -> Result<Option<NonceLedgerEntry>, AppError> {
        sqlx::query_as::<_, NonceLedgerEntry>("SELECT * FROM guest_pass_nonces WHERE pass_id = $1 AND nonce_hash = $2")
            .bind(pass_id).bind(nonce_hash).fetch_optional(&self.pool).await.map_err(AppError::Database)
    }
}
