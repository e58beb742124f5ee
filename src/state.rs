use std::sync::Arc;
use crate::config::Config;
use crate::domain::ports::GuestPassRepository;
use crate::domain::services::{
    expiration::ExpirationReaper,
    guest_pass_service::GuestPassService,
    qr_rotation::QrRotationEngine,
    rate_limiter::RateLimiter,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub guest_pass_repo: Arc<dyn GuestPassRepository>,
    pub guest_pass_service: Arc<GuestPassService>,
    pub rotation_engine: Arc<QrRotationEngine>,
    pub expiration_reaper: Arc<ExpirationReaper>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    /// Wires the services around a repository. Used by the factory and by tests.
    pub fn new(config: Config, guest_pass_repo: Arc<dyn GuestPassRepository>) -> Self {
        let rotation_engine = Arc::new(QrRotationEngine::new(
            guest_pass_repo.clone(),
            config.qr_rotation_interval,
            config.store_timeout,
        ));
        let guest_pass_service = Arc::new(GuestPassService::new(
            guest_pass_repo.clone(),
            rotation_engine.clone(),
            config.guest_pass_expiry_hours,
            config.store_timeout,
        ));
        let expiration_reaper = Arc::new(ExpirationReaper::new(guest_pass_repo.clone(), config.store_timeout));
        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limits));

        Self {
            config,
            guest_pass_repo,
            guest_pass_service,
            rotation_engine,
            expiration_reaper,
            rate_limiter,
        }
    }
}
