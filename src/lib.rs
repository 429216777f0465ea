//! Resilience core for CA maintenance services.
//!
//! Two building blocks plus one service that uses them:
//!
//! - [`rpc`]: correlates asynchronous replies with the requests that caused
//!   them, and evicts requests that timed out once a grace period passes.
//! - [`scheduler`]: runs named batch jobs on a fixed cadence and backs off
//!   exponentially while a downstream dependency is unavailable.
//! - [`updater`]: the OCSP updater loops, which keep certificate status
//!   responses and CT submissions current.
//!
//! A [`context::ServiceContext`] built at startup carries the clock, the
//! metrics sink, the shared pending-response table and the shutdown
//! coordinator to every component.

pub mod clock;
pub mod config;
pub mod context;
pub mod health;
pub mod rpc;
pub mod scheduler;
pub mod shutdown;
pub mod telemetry;
pub mod updater;

pub use config::ServiceConfig;
pub use context::ServiceContext;
pub use shutdown::{ShutdownCoordinator, ShutdownResult, ShutdownState};
