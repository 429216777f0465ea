//! Telemetry: structured logging, tick spans and metrics sinks.

mod logging;
mod metrics;
mod spans;
mod store;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use metrics::{FacadeStats, ScopedStats, Stats};
pub use spans::{SpanExt, TickSpan};
pub use store::{MetricsSnapshot, MetricsStore, TimerSummary};
