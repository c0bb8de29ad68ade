//! Background expiry sweep for idle sessions.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::orchestrator::session_manager::SessionManager;

/// Spawn the periodic expiry task.
///
/// The first sweep runs immediately, then every `interval`, until `cancel`
/// fires.
#[must_use]
pub fn spawn_expiry_task(
    sessions: Arc<SessionManager>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("expiry task shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(err) = sessions.sweep_expired().await {
                        error!(?err, "expiry sweep failed");
                    }
                }
            }
        }
    })
}
