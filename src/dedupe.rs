//! Deduplication of accepted webhook events.
//!
//! Stripe retries deliveries and may deliver the same event concurrently.
//! [`SeenSet`] records every event id accepted since process start so that
//! each id is accepted at most once.
//!
//! # Lifetime
//!
//! The set only grows. There is no TTL and no eviction, and nothing is
//! persisted: the set lives exactly as long as the [`SeenSet`] handles that
//! share it.
//!
//! # Atomicity
//!
//! [`SeenSet::record`] is a single insert-if-absent on a sharded concurrent
//! set. Checking with [`SeenSet::contains`] and then inserting would let two
//! concurrent requests for the same new id both observe "absent".

use std::sync::Arc;

use dashmap::DashSet;

use crate::types::EventId;

/// Result of recording an event id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    /// The id had not been recorded before (or is anonymous).
    FirstSeen,
    /// The id was already recorded.
    Duplicate,
}

/// The set of event ids accepted since process start.
///
/// Clones share the same storage, so a handle can be injected into a
/// receiver and inspected from a test. Independent sets are created with
/// [`SeenSet::new`]; there is no process-wide instance.
#[derive(Debug, Clone, Default)]
pub struct SeenSet {
    ids: Arc<DashSet<EventId>>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically records `id` if it is absent.
    ///
    /// Anonymous ids are never stored and always report
    /// [`Insertion::FirstSeen`].
    pub fn record(&self, id: &EventId) -> Insertion {
        if id.is_anonymous() {
            return Insertion::FirstSeen;
        }
        if self.ids.insert(id.clone()) {
            Insertion::FirstSeen
        } else {
            Insertion::Duplicate
        }
    }

    pub fn contains(&self, id: &EventId) -> bool {
        self.ids.contains(id)
    }

    /// Number of distinct ids recorded.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
