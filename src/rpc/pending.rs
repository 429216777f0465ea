//! Table of in-flight requests awaiting a reply.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use super::timeout_queue::TimeoutQueue;
use super::CorrelationId;
use crate::clock::Clock;

struct PendingEntry<H> {
    handle: H,
    generation: u64,
}

struct Inner<H> {
    pending: HashMap<CorrelationId, PendingEntry<H>>,
    timed_out: TimeoutQueue,
}

/// Delivery handles for outstanding requests, keyed by correlation id.
///
/// The table and its timeout heap sit behind one lock, so marking an id as
/// timed out can never interleave with a delivery removing that same id.
pub struct PendingResponses<H> {
    inner: RwLock<Inner<H>>,
    clock: Arc<dyn Clock>,
    /// How long a timed-out entry stays in the table before it is purged.
    cleanup_wait: Duration,
    next_generation: AtomicU64,
}

impl<H> PendingResponses<H> {
    pub fn new(clock: Arc<dyn Clock>, cleanup_wait: Duration) -> Self {
        Self {
            inner: RwLock::new(Inner {
                pending: HashMap::new(),
                timed_out: TimeoutQueue::new(),
            }),
            clock,
            cleanup_wait,
            next_generation: AtomicU64::new(1),
        }
    }

    /// Register a handle for `id`. A handle already registered under the
    /// same id is dropped.
    pub fn register(&self, id: CorrelationId, handle: H) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let previous = self
            .inner
            .write()
            .pending
            .insert(id, PendingEntry { handle, generation });
        if previous.is_some() {
            tracing::debug!("replaced pending handle for reused correlation id");
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.read().pending.contains_key(id)
    }

    /// Remove and return the handle for `id`, if any.
    pub fn take(&self, id: &str) -> Option<H> {
        self.inner.write().pending.remove(id).map(|e| e.handle)
    }

    /// Idempotent delete. Returns whether an entry was present.
    pub fn remove(&self, id: &str) -> bool {
        self.take(id).is_some()
    }

    /// Record that the request for `id` timed out. No-op when `id` is not
    /// pending, e.g. because its reply already arrived.
    pub fn mark_timed_out(&self, id: &str) -> bool {
        let now = self.clock.now();
        let mut inner = self.inner.write();
        let Some((key, entry)) = inner.pending.get_key_value(id) else {
            return false;
        };
        let (key, generation) = (key.clone(), entry.generation);
        inner.timed_out.push(now, key, generation);
        true
    }

    /// Purge every timed-out entry whose grace period has elapsed.
    ///
    /// Returns the number of entries removed from the table. Records whose
    /// entry was already delivered, or re-registered under the same id, are
    /// discarded without touching the table.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        if !self.inner.read().timed_out.peek_expired(now, self.cleanup_wait) {
            return 0;
        }

        let mut inner = self.inner.write();
        let mut evicted = 0;
        while let Some(record) = inner.timed_out.pop_if_expired(now, self.cleanup_wait) {
            let current = inner.pending.get(&record.id).map(|e| e.generation);
            if current == Some(record.generation) {
                inner.pending.remove(&record.id);
                evicted += 1;
            }
        }
        evicted
    }

    /// Number of pending entries, including timed-out ones not yet purged.
    pub fn len(&self) -> usize {
        self.inner.read().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().pending.is_empty()
    }

    pub fn timed_out_len(&self) -> usize {
        self.inner.read().timed_out.len()
    }

    pub fn cleanup_wait(&self) -> Duration {
        self.cleanup_wait
    }
}

impl<H: Clone> PendingResponses<H> {
    /// Read-only lookup.
    pub fn lookup(&self, id: &str) -> Option<H> {
        self.inner.read().pending.get(id).map(|e| e.handle.clone())
    }
}

#[cfg(test)]
#[path = "pending_tests.rs"]
mod tests;
