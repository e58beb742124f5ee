use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, info_span, Instrument};
use crate::state::AppState;

const ROTATION_BATCH_SIZE: i64 = 500;

pub fn start_background_workers(state: Arc<AppState>) -> (JoinHandle<()>, JoinHandle<()>) {
    let reaper = tokio::spawn(start_expiration_reaper(state.clone()));
    let rotation = tokio::spawn(start_qr_rotation(state));
    (reaper, rotation)
}

/// Runs the expiration sweep on a fixed period, off the request path.
pub async fn start_expiration_reaper(state: Arc<AppState>) {
    info!("Starting expiration reaper (every {:?})...", state.config.expiration_sweep_interval);

    let mut ticker = interval(state.config.expiration_sweep_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let span = info_span!("expiration_sweep");
        async {
            match state.expiration_reaper.sweep().await {
                Ok(0) => debug!("No guest passes to expire"),
                Ok(count) => info!(count, "Expiration sweep completed"),
                Err(e) => error!("Expiration sweep failed: {:?}", e),
            }
        }
            .instrument(span)
            .await;
    }
}

/// Rotates QR secrets that have outlived the rotation interval. A failed
/// rotation leaves the previous secret in place until the next tick.
pub async fn start_qr_rotation(state: Arc<AppState>) {
    let period = state.config.qr_rotation_interval;
    info!("Starting QR rotation worker (every {:?})...", period);

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let span = info_span!("qr_rotation");
        async {
            match state.rotation_engine.rotate_due(ROTATION_BATCH_SIZE).await {
                Ok(0) => debug!("No QR secrets due for rotation"),
                Ok(count) => info!(count, "Rotated QR secrets"),
                Err(e) => error!("QR rotation sweep failed: {:?}", e),
            }
        }
            .instrument(span)
            .await;
    }
}
