//! Time sources.
//!
//! Components that make decisions based on elapsed time (timeout eviction,
//! staleness windows) read time through [`Clock`] so tests can drive it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Source of monotonic and wall-clock time.
pub trait Clock: Send + Sync {
    /// Monotonic time, used for grace-period arithmetic.
    fn now(&self) -> Instant;

    /// Wall-clock time, used for database predicates.
    fn utc_now(&self) -> DateTime<Utc>;
}

/// Clock backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for tests.
///
/// Both readings start at construction time and only move when
/// [`FakeClock::advance`] is called.
#[derive(Debug)]
pub struct FakeClock {
    base: Instant,
    base_utc: DateTime<Utc>,
    offset: Mutex<Duration>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Create a fake clock whose wall-clock reading starts at `start`.
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            base: Instant::now(),
            base_utc: start,
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        let offset = *self.offset.lock();
        // Offsets beyond chrono's range saturate at the base reading.
        chrono::Duration::from_std(offset)
            .ok()
            .and_then(|d| self.base_utc.checked_add_signed(d))
            .unwrap_or(self.base_utc)
    }
}
