//! Background retention timer.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, warn};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::RetentionManager;
use crate::error_handling::SnapshotError;
use crate::models::RetentionPolicy;

/// Starts a background task that sweeps the backup root every `period`.
///
/// The first sweep runs immediately. The task stops when the returned token is
/// cancelled; a sweep already in progress finishes first.
///
/// # Errors
///
/// Returns `SnapshotError::Configuration` if `period` is zero.
pub fn start_retention_task(
    manager: Arc<RetentionManager>,
    policy: RetentionPolicy,
    period: Duration,
) -> Result<(CancellationToken, tokio::task::JoinHandle<()>), SnapshotError> {
    if period.is_zero() {
        return Err(SnapshotError::Configuration(
            "sweep interval must be positive".to_string(),
        ));
    }
    let shutdown = CancellationToken::new();
    let task_shutdown = shutdown.clone();

    let handle = tokio::spawn(async move {
        let mut ticker = interval(period);
        // A slow sweep should not trigger a burst of catch-up sweeps.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match manager.sweep(policy).await {
                        Ok(report) => {
                            for (file, err) in &report.failed {
                                warn!("Retention could not delete {file}: {err}");
                            }
                        }
                        Err(e) => error!("Retention sweep failed: {e}"),
                    }
                }
                _ = task_shutdown.cancelled() => {
                    debug!("Retention background task shutting down");
                    break;
                }
            }
        }
    });

    Ok((shutdown, handle))
}
