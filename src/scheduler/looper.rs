//! Fixed-cadence loop driving one work unit, with backoff.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::Instrument;

use super::backoff::BackoffPolicy;
use super::work::WorkUnit;
use crate::shutdown::ShutdownCoordinator;
use crate::telemetry::{ScopedStats, SpanExt, Stats, TickSpan};

/// Static configuration of one loop.
#[derive(Debug, Clone)]
pub struct LooperConfig {
    pub name: String,
    pub batch_size: usize,
    /// Cadence: a tick starts at most once per window.
    pub tick_window: Duration,
    pub backoff: BackoffPolicy,
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("both batch size and tick window are required, not running '{name}' loop")]
    MissingBatchOrWindow { name: String },
}

/// Result of the most recent tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TickOutcome {
    NotRun,
    Succeeded,
    Unavailable,
    Failed,
}

/// Observable state of a loop.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleState {
    pub name: String,
    pub batch_size: usize,
    pub tick_window: Duration,
    pub backoff: BackoffPolicy,
    /// Consecutive ticks that failed with the unavailable class.
    pub failures: u32,
    pub ticks: u64,
    pub last_outcome: TickOutcome,
}

/// Shared read handle on a loop's [`ScheduleState`].
#[derive(Clone)]
pub struct LoopStatus(Arc<RwLock<ScheduleState>>);

impl LoopStatus {
    pub fn snapshot(&self) -> ScheduleState {
        self.0.read().clone()
    }

    pub fn is_backing_off(&self) -> bool {
        self.0.read().failures > 0
    }
}

/// Drives a [`WorkUnit`] on a fixed cadence.
pub struct Looper {
    config: LooperConfig,
    work: Arc<dyn WorkUnit>,
    stats: ScopedStats,
    failures: u32,
    status: LoopStatus,
}

impl Looper {
    /// Build a loop. A zero batch size or zero tick window is rejected and
    /// the work unit never runs.
    pub fn new(
        config: LooperConfig,
        work: Arc<dyn WorkUnit>,
        stats: &ScopedStats,
    ) -> Result<Self, SchedulerError> {
        if config.batch_size == 0 || config.tick_window.is_zero() {
            return Err(SchedulerError::MissingBatchOrWindow { name: config.name });
        }
        let status = LoopStatus(Arc::new(RwLock::new(ScheduleState {
            name: config.name.clone(),
            batch_size: config.batch_size,
            tick_window: config.tick_window,
            backoff: config.backoff,
            failures: 0,
            ticks: 0,
            last_outcome: TickOutcome::NotRun,
        })));
        Ok(Self {
            stats: stats.scope(&[config.name.as_str()]),
            config,
            work,
            failures: 0,
            status,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn status(&self) -> LoopStatus {
        self.status.clone()
    }

    /// Run the work unit once and return how long to sleep before the next
    /// tick.
    pub async fn tick(&mut self) -> Duration {
        let span = TickSpan::new(&self.config.name, self.config.batch_size);
        let start = Instant::now();
        let result = self
            .work
            .run(self.config.batch_size)
            .instrument(span.clone())
            .await;
        let elapsed = start.elapsed();
        span.record_result(&result);
        span.record("elapsed_ms", elapsed.as_millis() as u64);

        let window = self.config.tick_window;
        self.stats.timing("tick_duration", elapsed);
        self.stats.inc("ticks", 1);
        if elapsed > window {
            self.stats.inc("long_ticks", 1);
        }

        // An overrunning tick is followed immediately by the next one; missed
        // windows are not caught up.
        let mut sleep = window.saturating_sub(elapsed);
        let outcome = match &result {
            Ok(()) => {
                self.failures = 0;
                TickOutcome::Succeeded
            }
            Err(e) => {
                self.stats.inc("failed_ticks", 1);
                tracing::warn!(loop_name = %self.config.name, error = %e, "tick failed");
                if !e.is_unavailable() {
                    TickOutcome::Failed
                } else {
                    if self.config.backoff.is_enabled() {
                        self.failures = self.failures.saturating_add(1);
                        sleep = self.config.backoff.delay(self.failures, window);
                        tracing::info!(
                            loop_name = %self.config.name,
                            failures = self.failures,
                            backoff_ms = sleep.as_millis() as u64,
                            "backing off"
                        );
                    }
                    TickOutcome::Unavailable
                }
            }
        };

        let mut state = self.status.0.write();
        state.failures = self.failures;
        state.ticks += 1;
        state.last_outcome = outcome;
        drop(state);

        sleep
    }

    /// Tick until shutdown. Cancellation is checked before every tick and
    /// raced against every sleep; a tick that has started runs to
    /// completion.
    pub async fn run(mut self, shutdown: Arc<ShutdownCoordinator>) {
        let token = shutdown.token();
        tracing::info!(
            loop_name = %self.config.name,
            batch_size = self.config.batch_size,
            tick_window_ms = self.config.tick_window.as_millis() as u64,
            "loop started"
        );
        loop {
            let Some(in_flight) = shutdown.track() else {
                break;
            };
            let sleep = self.tick().await;
            drop(in_flight);

            tokio::select! {
                biased;
                () = token.cancelled() => break,
                () = tokio::time::sleep(sleep) => {}
            }
        }
        tracing::info!(loop_name = %self.config.name, "loop stopped");
    }

    pub fn spawn(self, shutdown: Arc<ShutdownCoordinator>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

#[cfg(test)]
#[path = "looper_tests.rs"]
mod tests;
