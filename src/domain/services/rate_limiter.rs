//! Per-identity request throttling with independent tiers.
//!
//! Each tier keeps a sliding log of attempt instants per identity. Every
//! attempt that gets past the limiter is recorded, whether or not the
//! operation behind it later succeeds. Counters live behind a mutex per tier,
//! so concurrent requests never lose increments.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::RateLimitSettings;
use crate::error::AppError;

const CLEANUP_EVERY: u64 = 256;
const MAX_TRACKED_IDENTITIES: usize = 50_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitTier {
    Create,
    Rsvp,
    Scan,
    General,
}

impl RateLimitTier {
    pub const ALL: [RateLimitTier; 4] = [
        RateLimitTier::Create,
        RateLimitTier::Rsvp,
        RateLimitTier::Scan,
        RateLimitTier::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitTier::Create => "create",
            RateLimitTier::Rsvp => "rsvp",
            RateLimitTier::Scan => "scan",
            RateLimitTier::General => "general",
        }
    }

    pub fn default_limit(&self) -> TierLimit {
        let (limit, minutes) = match self {
            RateLimitTier::Create => (10, 15),
            RateLimitTier::Rsvp => (3, 5),
            RateLimitTier::Scan => (30, 1),
            RateLimitTier::General => (100, 15),
        };
        TierLimit { limit, window: Duration::from_secs(minutes * 60) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierLimit {
    pub limit: u32,
    pub window: Duration,
}

struct TierState {
    limit: TierLimit,
    attempts: Mutex<HashMap<String, VecDeque<Instant>>>,
}

pub struct RateLimiter {
    tiers: HashMap<RateLimitTier, TierState>,
    checks: AtomicU64,
}

impl RateLimiter {
    pub fn new(settings: &RateLimitSettings) -> Self {
        let tiers = RateLimitTier::ALL
            .into_iter()
            .map(|tier| {
                let state = TierState {
                    limit: settings.for_tier(tier),
                    attempts: Mutex::new(HashMap::new()),
                };
                (tier, state)
            })
            .collect();

        Self { tiers, checks: AtomicU64::new(0) }
    }

    pub fn check(&self, tier: RateLimitTier, identity: &str) -> Result<(), AppError> {
        self.check_at(tier, identity, Instant::now())
    }

    /// Records an attempt at `now`, or returns `RateLimited` with the time
    /// until the oldest attempt in the window ages out.
    pub fn check_at(&self, tier: RateLimitTier, identity: &str, now: Instant) -> Result<(), AppError> {
        let state = self.tiers.get(&tier).ok_or(AppError::Internal)?;
        let window = state.limit.window;

        let count = self.checks.fetch_add(1, Ordering::Relaxed);
        let mut attempts = state.attempts.lock().map_err(|_| AppError::Internal)?;

        if count > 0 && count % CLEANUP_EVERY == 0 {
            prune(&mut attempts, window, now);
        }
        if !attempts.contains_key(identity) && attempts.len() >= MAX_TRACKED_IDENTITIES {
            prune(&mut attempts, window, now);
            if attempts.len() >= MAX_TRACKED_IDENTITIES {
                warn!(tier = tier.as_str(), "Rate limiter identity table full, rejecting new identity");
                return Err(AppError::RateLimited { retry_after: window });
            }
        }

        let log = attempts.entry(identity.to_string()).or_default();
        while log.front().is_some_and(|t| now.saturating_duration_since(*t) >= window) {
            log.pop_front();
        }

        if log.len() >= state.limit.limit as usize {
            let oldest = log.front().copied().unwrap_or(now);
            let retry_after = window.saturating_sub(now.saturating_duration_since(oldest));
            debug!(tier = tier.as_str(), identity, "Rate limit exceeded");
            return Err(AppError::RateLimited { retry_after: retry_after.max(Duration::from_millis(1)) });
        }

        log.push_back(now);
        Ok(())
    }
}

fn prune(attempts: &mut HashMap<String, VecDeque<Instant>>, window: Duration, now: Instant) {
    attempts.retain(|_, log| log.back().is_some_and(|t| now.saturating_duration_since(*t) < window));
}
