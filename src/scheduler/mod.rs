//! Recurring batch scheduling.
//!
//! Each [`Looper`] drives one named [`WorkUnit`] on a fixed cadence, records
//! tick timing and outcome metrics, and backs off exponentially while the
//! work unit reports its downstream as unavailable.

mod backoff;
mod looper;
mod work;

pub use backoff::{retry_backoff, BackoffPolicy};
pub use looper::{
    LoopStatus, Looper, LooperConfig, ScheduleState, SchedulerError, TickOutcome,
};
pub use work::{TickError, WorkUnit};
