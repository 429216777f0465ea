//! Health reporting for liveness and readiness checks.

use std::time::Instant;

use serde::Serialize;

use crate::rpc::PendingResponses;
use crate::scheduler::{LoopStatus, ScheduleState};
use crate::shutdown::ShutdownState;

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Detailed health report.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub state: HealthState,
    pub shutdown: ShutdownState,
    pub loops: Vec<ScheduleState>,
    pub pending_requests: usize,
    pub timed_out_requests: usize,
    pub uptime_secs: u64,
}

/// Aggregates health information from the loops and the pending table.
pub struct HealthChecker {
    loops: Vec<LoopStatus>,
    start_time: Instant,
}

impl HealthChecker {
    pub fn new(loops: Vec<LoopStatus>) -> Self {
        Self {
            loops,
            start_time: Instant::now(),
        }
    }

    /// Check liveness: process is responsive.
    pub fn is_alive(&self) -> bool {
        true
    }

    /// Ready while running and no loop is backing off.
    pub fn is_ready(&self, shutdown_state: ShutdownState) -> bool {
        self.compute_state(shutdown_state) == HealthState::Healthy
    }

    pub fn report<H>(
        &self,
        shutdown_state: ShutdownState,
        pending: &PendingResponses<H>,
    ) -> HealthReport {
        HealthReport {
            state: self.compute_state(shutdown_state),
            shutdown: shutdown_state,
            loops: self.loops.iter().map(LoopStatus::snapshot).collect(),
            pending_requests: pending.len(),
            timed_out_requests: pending.timed_out_len(),
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    fn compute_state(&self, shutdown_state: ShutdownState) -> HealthState {
        if shutdown_state != ShutdownState::Running {
            return HealthState::Unhealthy;
        }
        if self.loops.iter().any(LoopStatus::is_backing_off) {
            return HealthState::Degraded;
        }
        HealthState::Healthy
    }
}
