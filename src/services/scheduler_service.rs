//! Background task scheduler.
//!
//! Runs periodic housekeeping: expired token rows are deleted hourly. Expiry
//! is enforced at resolve time regardless, so a missed tick only delays
//! cleanup.

use std::sync::Arc;

use sqlx::PgPool;
use tokio::time::{interval, Duration};

use crate::config::Config;
use crate::services::token_service::TokenService;

/// Spawn all background scheduler tasks. Fire-and-forget; the tasks live for
/// the lifetime of the process.
pub fn spawn_all(db: PgPool, config: Arc<Config>) {
    // Expired token purge (every hour)
    {
        let service = TokenService::new(db, config);
        tokio::spawn(async move {
            // Initial delay to let the server start up
            tokio::time::sleep(Duration::from_secs(30)).await;
            let mut ticker = interval(Duration::from_secs(3600));

            loop {
                ticker.tick().await;
                match service.purge_expired().await {
                    Ok(0) => {}
                    Ok(purged) => tracing::info!(purged, "Expired tokens removed"),
                    Err(e) => tracing::warn!("Token purge failed: {}", e),
                }
            }
        });
    }
}
