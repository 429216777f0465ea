//! Min-heap of requests that were marked as timed out.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use super::CorrelationId;

/// A correlation id that was marked as timed out at `marked_at`.
#[derive(Debug, Clone)]
pub struct TimeoutRecord {
    pub marked_at: Instant,
    pub id: CorrelationId,
    /// Registration generation of the entry at mark time.
    pub generation: u64,
}

impl TimeoutRecord {
    /// True once `grace` has fully elapsed since the mark.
    pub fn is_expired(&self, now: Instant, grace: Duration) -> bool {
        match self.marked_at.checked_add(grace) {
            Some(eligible_at) => eligible_at <= now,
            None => false,
        }
    }
}

// Equality follows the heap ordering: (`marked_at`, `generation`). The
// generation counter is table-wide, so two records with the same pair are
// the same mark and `id` is never needed to tell them apart.
impl PartialEq for TimeoutRecord {
    fn eq(&self, other: &Self) -> bool {
        self.marked_at == other.marked_at && self.generation == other.generation
    }
}

impl Eq for TimeoutRecord {}

impl PartialOrd for TimeoutRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeoutRecord {
    // Reversed so the std max-heap yields the earliest mark first.
    fn cmp(&self, other: &Self) -> Ordering {
        match other.marked_at.cmp(&self.marked_at) {
            Ordering::Equal => other.generation.cmp(&self.generation),
            ord => ord,
        }
    }
}

/// Timeout records ordered by mark time, earliest at the root.
///
/// Only the root is ever inspected. The grace period is the same for every
/// record, so the earliest mark is always the first to become eligible and
/// an ineligible root means nothing else is eligible either.
#[derive(Debug, Default)]
pub struct TimeoutQueue {
    heap: BinaryHeap<TimeoutRecord>,
}

impl TimeoutQueue {
    pub fn new() -> Self {
        Self { heap: BinaryHeap::new() }
    }

    pub fn push(&mut self, marked_at: Instant, id: CorrelationId, generation: u64) {
        self.heap.push(TimeoutRecord { marked_at, id, generation });
    }

    /// Whether the root is eligible for eviction. Does not mutate.
    pub fn peek_expired(&self, now: Instant, grace: Duration) -> bool {
        self.heap.peek().map_or(false, |r| r.is_expired(now, grace))
    }

    /// Pop the root only if `marked_at + grace <= now`.
    ///
    /// Returns `None` and leaves the heap untouched otherwise.
    pub fn pop_if_expired(&mut self, now: Instant, grace: Duration) -> Option<TimeoutRecord> {
        if self.peek_expired(now, grace) {
            self.heap.pop()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
