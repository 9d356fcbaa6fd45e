//! Seen-set for packet-level duplicate suppression.
//!
//! Every packet id that this node has delivered, relayed or originated is
//! recorded here. A packet whose id is already present is dropped without
//! being surfaced or forwarded, which is what bounds flood amplification.
//!
//! The filter is unbounded by default: it grows for the lifetime of the
//! process. A capacity turns it into a rolling window over the most recent
//! ids, in which case exactly-once delivery only holds inside that window.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use murmur_types::PacketId;

/// Insert-only set of seen packet ids, optionally windowed.
pub struct DuplicateFilter {
    capacity: Option<usize>,
    seen: HashSet<PacketId>,
    order: VecDeque<PacketId>,
}

impl DuplicateFilter {
    /// Create a filter that never forgets.
    pub fn unbounded() -> Self {
        Self {
            capacity: None,
            seen: HashSet::new(),
            order: VecDeque::new(),
        }
    }

    /// Create a filter remembering only the last `capacity` ids.
    pub fn windowed(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity: Some(capacity),
            seen: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    pub fn new(capacity: Option<usize>) -> Self {
        match capacity {
            Some(n) => Self::windowed(n),
            None => Self::unbounded(),
        }
    }

    pub fn contains(&self, id: &PacketId) -> bool {
        self.seen.contains(id)
    }

    /// Record `id`. Returns `true` if it was not seen before.
    pub fn insert(&mut self, id: PacketId) -> bool {
        if self.seen.contains(&id) {
            return false;
        }
        if let Some(capacity) = self.capacity {
            if self.seen.len() >= capacity {
                if let Some(old) = self.order.pop_front() {
                    self.seen.remove(&old);
                }
            }
            self.order.push_back(id);
        }
        self.seen.insert(id);
        true
    }

    /// Number of tracked ids.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl Default for DuplicateFilter {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// Shared handle to the pool's duplicate filter.
///
/// The pool owns the filter and hands a clone of this handle to every peer
/// it creates; all of them observe and extend the same set.
#[derive(Clone, Default)]
pub struct FilterHandle(Arc<Mutex<DuplicateFilter>>);

impl FilterHandle {
    pub fn new(filter: DuplicateFilter) -> Self {
        Self(Arc::new(Mutex::new(filter)))
    }

    pub fn contains(&self, id: &PacketId) -> bool {
        self.lock().contains(id)
    }

    /// Record `id`. Returns `true` if it was not seen before.
    pub fn insert(&self, id: PacketId) -> bool {
        self.lock().insert(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // Inserts are single-step, so a poisoned lock still guards a
    // consistent set.
    fn lock(&self) -> MutexGuard<'_, DuplicateFilter> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
