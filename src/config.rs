use std::env;
use std::time::Duration;
use thiserror::Error;

use crate::domain::services::rate_limiter::{RateLimitTier, TierLimit};

const DEFAULT_PAYMENT_ORIGINS: &str = "https://js.stripe.com,https://api.stripe.com,https://hooks.stripe.com";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Clone, Debug)]
pub struct RateLimitSettings {
    pub create: TierLimit,
    pub rsvp: TierLimit,
    pub scan: TierLimit,
    pub general: TierLimit,
}

impl RateLimitSettings {
    pub fn for_tier(&self, tier: RateLimitTier) -> TierLimit {
        match tier {
            RateLimitTier::Create => self.create,
            RateLimitTier::Rsvp => self.rsvp,
            RateLimitTier::Scan => self.scan,
            RateLimitTier::General => self.general,
        }
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            create: RateLimitTier::Create.default_limit(),
            rsvp: RateLimitTier::Rsvp.default_limit(),
            scan: RateLimitTier::Scan.default_limit(),
            general: RateLimitTier::General.default_limit(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub guest_pass_expiry_hours: i64,
    pub qr_rotation_interval: Duration,
    pub expiration_sweep_interval: Duration,
    pub store_timeout: Duration,
    pub enforce_https: bool,
    pub trust_proxy_headers: bool,
    pub host_api_token: Option<String>, // bearer token for host routes
    pub payment_origins: Vec<String>,
    pub rate_limits: RateLimitSettings,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;

        let mut rate_limits = RateLimitSettings::default();
        if let Some(limit) = tier_from_env("RATE_LIMIT_CREATE")? { rate_limits.create = limit; }
        if let Some(limit) = tier_from_env("RATE_LIMIT_RSVP")? { rate_limits.rsvp = limit; }
        if let Some(limit) = tier_from_env("RATE_LIMIT_SCAN")? { rate_limits.scan = limit; }
        if let Some(limit) = tier_from_env("RATE_LIMIT_GENERAL")? { rate_limits.general = limit; }

        let payment_origins = env::var("PAYMENT_ORIGINS")
            .unwrap_or_else(|_| DEFAULT_PAYMENT_ORIGINS.to_string())
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(String::from)
            .collect();

        Ok(Self {
            database_url,
            port: parse_env("PORT", 3000)?,
            guest_pass_expiry_hours: parse_env("GUEST_PASS_EXPIRY_HOURS", 4)?,
            qr_rotation_interval: Duration::from_secs(parse_env("QR_ROTATION_INTERVAL_SECS", 30)?),
            expiration_sweep_interval: Duration::from_secs(parse_env("EXPIRATION_SWEEP_INTERVAL_SECS", 60)?),
            store_timeout: Duration::from_millis(parse_env("STORE_TIMEOUT_MS", 2000)?),
            enforce_https: parse_env("ENFORCE_HTTPS", false)?,
            trust_proxy_headers: parse_env("TRUST_PROXY_HEADERS", false)?,
            host_api_token: env::var("HOST_API_TOKEN").ok().filter(|t| !t.is_empty()),
            payment_origins,
            rate_limits,
        })
    }

    /// Settings suitable for tests and local development against the given database.
    pub fn local(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            port: 0,
            guest_pass_expiry_hours: 4,
            qr_rotation_interval: Duration::from_secs(30),
            expiration_sweep_interval: Duration::from_secs(60),
            store_timeout: Duration::from_secs(2),
            enforce_https: false,
            trust_proxy_headers: true,
            host_api_token: None,
            payment_origins: DEFAULT_PAYMENT_ORIGINS.split(',').map(String::from).collect(),
            rate_limits: RateLimitSettings::default(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}

// Format: "<limit>/<window secs>", e.g. "30/60".
fn tier_from_env(name: &'static str) -> Result<Option<TierLimit>, ConfigError> {
    let Ok(value) = env::var(name) else { return Ok(None) };
    let invalid = || ConfigError::Invalid { name, value: value.clone() };

    let (limit, window) = value.split_once('/').ok_or_else(invalid)?;
    let limit: u32 = limit.trim().parse().map_err(|_| invalid())?;
    let window: u64 = window.trim().parse().map_err(|_| invalid())?;
    if limit == 0 || window == 0 {
        return Err(invalid());
    }

    Ok(Some(TierLimit { limit, window: Duration::from_secs(window) }))
}
