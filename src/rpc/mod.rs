//! Request/response correlation for the message-queue RPC client.
//!
//! Replies arrive off-band and are matched to their request by correlation
//! id. Requests that never get a reply are marked as timed out and reclaimed
//! by a background sweep once their grace period has passed.

mod cleaner;
mod client;
mod pending;
mod timeout_queue;

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use cleaner::{spawn_timeout_cleaner, MIN_SWEEP_INTERVAL};
pub use client::{ResponseTx, RpcClient, RpcError, Transport};
pub use pending::PendingResponses;
pub use timeout_queue::{TimeoutQueue, TimeoutRecord};

/// Opaque token linking a request to its eventual reply.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CorrelationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl Borrow<str> for CorrelationId {
    fn borrow(&self) -> &str {
        &self.0
    }
}
