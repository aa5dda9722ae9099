use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use clipsync_api::auth::AppState;

/// Background task that prunes stale pairing codes.
///
/// Codes are kept for `pairing_retention` past their expiry so that late
/// redemptions still report "expired" rather than "not found".
pub async fn run_cleanup_loop(state: AppState) {
    let mut interval = tokio::time::interval(Duration::from_secs(state.config.cleanup_interval_secs.max(1)));

    loop {
        interval.tick().await;

        match cleanup_expired(&state).await {
            Ok(count) => {
                if count > 0 {
                    info!("Cleanup: pruned {} stale pairing codes", count);
                }
            }
            Err(e) => {
                warn!("Cleanup error: {:#}", e);
            }
        }
    }
}

async fn cleanup_expired(state: &AppState) -> anyhow::Result<usize> {
    let state = state.clone();
    let cutoff = Utc::now() - state.config.pairing_retention;
    tokio::task::spawn_blocking(move || state.db.purge_expired_pairing_codes(cutoff)).await?
}
