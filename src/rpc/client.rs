//! RPC client built on the pending-response table.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;

use super::pending::PendingResponses;
use super::CorrelationId;
use crate::telemetry::Stats;

/// Single-use delivery handle for one reply payload.
pub type ResponseTx = oneshot::Sender<Vec<u8>>;

/// Outbound side of the message queue.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Publish `payload` tagged with `id`. Replies come back through
    /// [`RpcClient::deliver`].
    async fn publish(&self, id: &CorrelationId, payload: Vec<u8>) -> Result<(), RpcError>;
}

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("{client}: no reply within {timeout:?}")]
    Timeout { client: String, timeout: Duration },
    #[error("{client}: pending request dropped before a reply arrived")]
    Dropped { client: String },
    #[error("transport error: {0}")]
    Transport(String),
}

impl RpcError {
    /// Whether the remote service should be treated as unavailable.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Sends requests and matches replies delivered off-band.
pub struct RpcClient<T> {
    name: String,
    transport: T,
    pending: Arc<PendingResponses<ResponseTx>>,
    call_timeout: Duration,
    stats: Arc<dyn Stats>,
}

impl<T: Transport> RpcClient<T> {
    pub fn new(
        name: impl Into<String>,
        transport: T,
        pending: Arc<PendingResponses<ResponseTx>>,
        call_timeout: Duration,
        stats: Arc<dyn Stats>,
    ) -> Self {
        Self {
            name: name.into(),
            transport,
            pending,
            call_timeout,
            stats,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Send `payload` and wait for its reply.
    ///
    /// On timeout the request is marked as timed out so the cleaner can
    /// reclaim it after the grace period. Dropping the returned future
    /// before it completes marks the request the same way.
    pub async fn dispatch(&self, payload: Vec<u8>) -> Result<Vec<u8>, RpcError> {
        let id = CorrelationId::generate();
        let (tx, rx) = oneshot::channel();
        self.pending.register(id.clone(), tx);
        let mut in_flight = InFlight {
            pending: &self.pending,
            id: &id,
            armed: true,
        };

        if let Err(e) = self.transport.publish(&id, payload).await {
            in_flight.armed = false;
            self.pending.remove(id.as_str());
            self.stats.inc(&format!("rpc.{}.publish_errors", self.name), 1);
            return Err(e);
        }

        let outcome = tokio::time::timeout(self.call_timeout, rx).await;
        // Every path below has already settled the entry.
        in_flight.armed = false;
        match outcome {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(RpcError::Dropped { client: self.name.clone() }),
            Err(_) => {
                self.pending.mark_timed_out(id.as_str());
                self.stats.inc(&format!("rpc.{}.timeouts", self.name), 1);
                tracing::warn!(client = %self.name, correlation_id = %id, "rpc call timed out");
                Err(RpcError::Timeout {
                    client: self.name.clone(),
                    timeout: self.call_timeout,
                })
            }
        }
    }

    /// Hand a reply to the request waiting on `id`.
    ///
    /// Returns false for replies nobody is waiting for any more; those are
    /// dropped.
    pub fn deliver(&self, id: &str, payload: Vec<u8>) -> bool {
        match self.pending.take(id) {
            Some(tx) => tx.send(payload).is_ok(),
            None => {
                tracing::debug!(client = %self.name, correlation_id = %id, "dropping unmatched reply");
                false
            }
        }
    }
}

/// Marks a registered request as timed out if its caller goes away
/// mid-call.
struct InFlight<'a> {
    pending: &'a PendingResponses<ResponseTx>,
    id: &'a CorrelationId,
    armed: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.armed && self.pending.mark_timed_out(self.id.as_str()) {
            tracing::debug!(correlation_id = %self.id, "rpc call abandoned by caller");
        }
    }
}
