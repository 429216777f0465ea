//! Background sweep of timed-out pending responses.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::pending::PendingResponses;
use crate::telemetry::Stats;

/// Shortest sweep period the cleaner will run with.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(10);

/// Spawn the cleaner loop. It sweeps `pending` every `interval` until
/// `shutdown` is cancelled. Intervals below [`MIN_SWEEP_INTERVAL`] are
/// raised to it.
pub fn spawn_timeout_cleaner<H>(
    pending: Arc<PendingResponses<H>>,
    interval: Duration,
    stats: Arc<dyn Stats>,
    shutdown: CancellationToken,
) -> JoinHandle<()>
where
    H: Send + Sync + 'static,
{
    if interval < MIN_SWEEP_INTERVAL {
        tracing::warn!(?interval, "sweep interval too short, using {:?}", MIN_SWEEP_INTERVAL);
    }
    let interval = interval.max(MIN_SWEEP_INTERVAL);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    tracing::info!("timeout cleaner: shutdown signal received");
                    break;
                }
                _ = ticker.tick() => {
                    let evicted = pending.sweep();
                    if evicted > 0 {
                        stats.inc("rpc.evicted", evicted as u64);
                        tracing::debug!(evicted, remaining = pending.len(), "purged timed out requests");
                    }
                }
            }
        }
    })
}
