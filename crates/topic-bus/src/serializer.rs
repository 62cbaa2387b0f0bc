//! # Serializer
//!
//! Restores publish order for one subscriber.
//!
//! `publish()` spawns an independent delivery task per subscriber per event,
//! and the scheduler gives no guarantee that the task carrying sequence 0
//! runs before the one carrying sequence 1. Each task hands its delivery to
//! the subscriber's Serializer, which holds it until every lower sequence
//! has been delivered.
//!
//! ```text
//! execute(d2, 2) ──► pending: [2]          next = 1
//! execute(d3, 3) ──► pending: [2, 3]       next = 1
//! execute(d1, 1) ──► pending: [1, 2, 3] ──► run d1, d2, d3   next = 4
//! ```
//!
//! Insertion and draining happen under one async lock, so concurrent
//! `execute` calls never interleave inside a drain. The lock is held while a
//! delivery awaits queue capacity; this is what makes backpressure apply in
//! order.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::VecDeque;
use std::future::Future;
use tokio::sync::Mutex;
use tracing::{trace, warn};

/// A delivery waiting for its predecessors.
struct Pending {
    sequence: u64,
    action: BoxFuture<'static, ()>,
}

struct SerializerState {
    /// Waiting deliveries, sorted by sequence.
    pending: VecDeque<Pending>,
    /// Sequence of the next delivery allowed to run.
    next_sequence: u64,
}

/// Per-subscriber reordering buffer.
pub struct Serializer {
    state: Mutex<SerializerState>,
}

impl Serializer {
    /// Create a serializer that expects sequence 0 first.
    #[must_use]
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Create a serializer that expects `sequence` first.
    ///
    /// Used when subscribing to a topic that already has published events.
    #[must_use]
    pub fn starting_at(sequence: u64) -> Self {
        Self {
            state: Mutex::new(SerializerState {
                pending: VecDeque::new(),
                next_sequence: sequence,
            }),
        }
    }

    /// Run `action` once every delivery with a lower sequence has run.
    ///
    /// If `sequence` is the next expected one, `action` runs before this call
    /// returns, followed by any queued successors that became ready. Otherwise
    /// it is queued and this call returns immediately.
    ///
    /// A sequence below the next expected value was already delivered (or
    /// skipped) and is discarded, as is one that is already queued.
    pub async fn execute<F>(&self, action: F, sequence: u64)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut state = self.state.lock().await;

        if sequence < state.next_sequence {
            warn!(
                sequence,
                next_sequence = state.next_sequence,
                "Discarding stale delivery"
            );
            return;
        }

        let index = state.pending.partition_point(|p| p.sequence < sequence);
        if state
            .pending
            .get(index)
            .is_some_and(|queued| queued.sequence == sequence)
        {
            warn!(sequence, "Discarding duplicate delivery");
            return;
        }
        state.pending.insert(
            index,
            Pending {
                sequence,
                action: action.boxed(),
            },
        );

        while state
            .pending
            .front()
            .is_some_and(|head| head.sequence == state.next_sequence)
        {
            let Some(item) = state.pending.pop_front() else {
                break;
            };
            trace!(sequence = item.sequence, "Releasing delivery");
            item.action.await;
            state.next_sequence = item.sequence + 1;
        }
    }

    /// Number of deliveries waiting for a predecessor.
    pub async fn pending(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    /// Sequence of the next delivery allowed to run.
    pub async fn next_sequence(&self) -> u64 {
        self.state.lock().await.next_sequence
    }
}

impl Default for Serializer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Serializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Serializer").finish_non_exhaustive()
    }
}
