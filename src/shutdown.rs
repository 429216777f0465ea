//! Graceful shutdown coordination.
//!
//! One coordinator is shared by every loop and background task of a
//! service. Initiating shutdown cancels the shared token, so loops stop
//! before their next tick or during their sleep, then waits for ticks that
//! are already running to finish.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Shutdown state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ShutdownState {
    Running,
    Draining,
    Stopped,
}

/// Result of a shutdown operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownResult {
    Complete,
    Timeout { remaining: u32 },
}

/// Coordinates graceful shutdown across service components.
pub struct ShutdownCoordinator {
    state: RwLock<ShutdownState>,
    token: CancellationToken,
    in_flight: Arc<AtomicU32>,
    notify: Arc<Notify>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ShutdownState::Running),
            token: CancellationToken::new(),
            in_flight: Arc::new(AtomicU32::new(0)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn state(&self) -> ShutdownState {
        *self.state.read()
    }

    /// Token cancelled when shutdown starts.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_accepting(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// Track a unit of in-flight work. Returns None once shutdown started.
    pub fn track(&self) -> Option<ShutdownGuard> {
        // Count first, then check: initiate() cancels before it reads the
        // count, so either we observe the cancel or it observes us.
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = ShutdownGuard {
            counter: Arc::clone(&self.in_flight),
            notify: Arc::clone(&self.notify),
        };
        if self.token.is_cancelled() {
            return None;
        }
        Some(guard)
    }

    pub fn in_flight_count(&self) -> u32 {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Stop accepting work and wait up to `timeout` for in-flight work.
    pub async fn initiate(&self, timeout: Duration) -> ShutdownResult {
        *self.state.write() = ShutdownState::Draining;
        self.token.cancel();
        tracing::info!(in_flight = self.in_flight_count(), "shutdown initiated");

        let result = self.wait_for_drain(timeout).await;

        *self.state.write() = ShutdownState::Stopped;
        match &result {
            ShutdownResult::Complete => tracing::info!("shutdown complete"),
            ShutdownResult::Timeout { remaining } => {
                tracing::warn!(remaining, "shutdown timed out with work in flight")
            }
        }
        result
    }

    async fn wait_for_drain(&self, timeout: Duration) -> ShutdownResult {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            // Register interest before checking so a release between the
            // check and the await is not missed.
            let notified = self.notify.notified();
            let count = self.in_flight_count();
            if count == 0 {
                return ShutdownResult::Complete;
            }

            tokio::select! {
                _ = notified => continue,
                _ = tokio::time::sleep_until(deadline) => {
                    let remaining = self.in_flight_count();
                    if remaining == 0 {
                        return ShutdownResult::Complete;
                    }
                    return ShutdownResult::Timeout { remaining };
                }
            }
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for in-flight work tracking.
pub struct ShutdownGuard {
    counter: Arc<AtomicU32>,
    notify: Arc<Notify>,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
        self.notify.notify_waiters();
    }
}
