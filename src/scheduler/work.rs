//! The contract between a loop and the batch work it drives.

use thiserror::Error;

/// Why a tick failed. Only [`TickError::Unavailable`] changes the loop's
/// cadence.
#[derive(Debug, Error)]
pub enum TickError {
    /// A downstream dependency is not answering. Drives backoff.
    #[error("downstream unavailable: {0}")]
    Unavailable(String),
    /// Any other failure. Counted and logged, cadence unchanged.
    #[error("{0}")]
    Failed(String),
}

impl TickError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// One recurring batch operation (fetch, act, persist).
#[async_trait::async_trait]
pub trait WorkUnit: Send + Sync {
    /// Process at most `batch_size` items.
    async fn run(&self, batch_size: usize) -> Result<(), TickError>;
}
