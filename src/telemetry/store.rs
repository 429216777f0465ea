//! In-process metrics store.
//!
//! Keeps every counter and timer in memory so the values can be exported in
//! a health report or asserted on in tests.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::metrics::Stats;

/// Snapshot of all metrics at a point in time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub counters: HashMap<String, u64>,
    pub timers: HashMap<String, TimerSummary>,
}

/// Summary statistics for a timer, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimerSummary {
    pub count: u64,
    pub sum_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
}

impl TimerSummary {
    fn first(ms: f64) -> Self {
        Self { count: 1, sum_ms: ms, min_ms: ms, max_ms: ms }
    }

    fn record(&mut self, ms: f64) {
        self.count += 1;
        self.sum_ms += ms;
        self.min_ms = self.min_ms.min(ms);
        self.max_ms = self.max_ms.max(ms);
    }

    pub fn mean_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum_ms / self.count as f64
        }
    }
}

/// Thread-safe metrics store.
#[derive(Default)]
pub struct MetricsStore {
    counters: RwLock<HashMap<String, u64>>,
    timers: RwLock<HashMap<String, TimerSummary>>,
}

impl MetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_counter(&self, name: &str, value: u64) {
        let mut counters = self.counters.write();
        match counters.get_mut(name) {
            Some(c) => *c += value,
            None => {
                counters.insert(name.to_owned(), value);
            }
        }
    }

    pub fn record_timer(&self, name: &str, elapsed: Duration) {
        let ms = elapsed.as_secs_f64() * 1000.0;
        let mut timers = self.timers.write();
        match timers.get_mut(name) {
            Some(t) => t.record(ms),
            None => {
                timers.insert(name.to_owned(), TimerSummary::first(ms));
            }
        }
    }

    /// Current value of a counter; zero if it was never incremented.
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.read().get(name).copied().unwrap_or(0)
    }

    pub fn timer(&self, name: &str) -> Option<TimerSummary> {
        self.timers.read().get(name).copied()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            counters: self.counters.read().clone(),
            timers: self.timers.read().clone(),
        }
    }
}

impl Stats for MetricsStore {
    fn inc(&self, name: &str, value: u64) {
        self.increment_counter(name, value);
    }

    fn timing(&self, name: &str, elapsed: Duration) {
        self.record_timer(name, elapsed);
    }
}
