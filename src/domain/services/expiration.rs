use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info};

use crate::domain::ports::GuestPassRepository;
use crate::domain::services::with_store_timeout;
use crate::error::AppError;

/// Moves `pending`/`active` passes past their cutoff to `expired`.
///
/// The sweep is a single conditional update, so running it again right away
/// changes nothing. Overlapping calls on one instance are skipped rather than
/// queued.
pub struct ExpirationReaper {
    repo: Arc<dyn GuestPassRepository>,
    store_timeout: Duration,
    running: AtomicBool,
}

impl ExpirationReaper {
    pub fn new(repo: Arc<dyn GuestPassRepository>, store_timeout: Duration) -> Self {
        Self { repo, store_timeout, running: AtomicBool::new(false) }
    }

    /// Returns the number of passes transitioned by this run.
    pub async fn sweep(&self) -> Result<u64, AppError> {
        let Some(_guard) = SweepGuard::acquire(&self.running) else {
            debug!("Expiration sweep already running, skipping");
            return Ok(0);
        };

        let expired = with_store_timeout(self.store_timeout, self.repo.expire_due(Utc::now())).await?;
        if expired > 0 {
            info!(expired, "Expired guest passes past their cutoff");
        }
        Ok(expired)
    }
}

/// Holds the reaper's running flag; cleared on drop, including when the sweep
/// future is cancelled mid-flight.
struct SweepGuard<'a>(&'a AtomicBool);

impl<'a> SweepGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SweepGuard(flag))
    }
}

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
