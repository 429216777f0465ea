//! Shared service dependencies.
//!
//! One [`ServiceContext`] is built at startup and handed to every component
//! that needs time, metrics, the pending-response table or shutdown.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::clock::{Clock, SystemClock};
use crate::config::RpcConfig;
use crate::rpc::{spawn_timeout_cleaner, PendingResponses, ResponseTx, RpcClient, Transport};
use crate::shutdown::ShutdownCoordinator;
use crate::telemetry::{FacadeStats, Stats};

#[derive(Clone)]
pub struct ServiceContext {
    pub clock: Arc<dyn Clock>,
    pub stats: Arc<dyn Stats>,
    pub shutdown: Arc<ShutdownCoordinator>,
    pub pending: Arc<PendingResponses<ResponseTx>>,
    pub rpc: RpcConfig,
}

impl ServiceContext {
    pub fn new(rpc: RpcConfig, clock: Arc<dyn Clock>, stats: Arc<dyn Stats>) -> Self {
        let pending = Arc::new(PendingResponses::new(Arc::clone(&clock), rpc.cleanup_wait));
        Self {
            clock,
            stats,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            pending,
            rpc,
        }
    }

    /// Context using the system clock and the `metrics` facade.
    pub fn system(rpc: RpcConfig) -> Self {
        Self::new(rpc, Arc::new(SystemClock), Arc::new(FacadeStats))
    }

    /// Start sweeping timed-out requests until shutdown.
    pub fn spawn_cleaner(&self) -> JoinHandle<()> {
        spawn_timeout_cleaner(
            Arc::clone(&self.pending),
            self.rpc.sweep_interval,
            Arc::clone(&self.stats),
            self.shutdown.token(),
        )
    }

    /// Client for one remote service sharing this context's pending table.
    pub fn rpc_client<T: Transport>(&self, name: &str, transport: T) -> RpcClient<T> {
        RpcClient::new(
            name,
            transport,
            Arc::clone(&self.pending),
            self.rpc.call_timeout,
            Arc::clone(&self.stats),
        )
    }
}
