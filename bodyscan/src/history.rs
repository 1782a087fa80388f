//! Bounded FIFO history.
//!
//! Every rolling record in the crate (detection results, validated
//! measurements, performance snapshots, alerts, optimization decisions,
//! accuracy entries) is kept in a [`BoundedHistory`]. Pushing past the
//! configured capacity evicts the oldest entry first.
//!
//! Readers never get a live reference into a shared history: owners expose
//! [`BoundedHistory::snapshot`] copies instead.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Append-then-evict ring buffer with a fixed capacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundedHistory<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedHistory<T> {
    /// Create an empty history holding at most `capacity` entries.
    ///
    /// A capacity of zero is treated as one so the latest entry is always
    /// observable.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Append an entry, returning the evicted oldest entry if the cap was hit.
    pub fn push(&mut self, entry: T) -> Option<T> {
        self.entries.push_back(entry);
        if self.entries.len() > self.capacity {
            self.entries.pop_front()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recently pushed entry.
    pub fn latest(&self) -> Option<&T> {
        self.entries.back()
    }

    /// Iterate oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.entries.iter()
    }

    /// Iterate over the newest `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &T> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Change the capacity, evicting oldest entries if it shrank.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }
}

impl<T: Clone> BoundedHistory<T> {
    /// Point-in-time copy of the entries, oldest first.
    pub fn snapshot(&self) -> Vec<T> {
        self.entries.iter().cloned().collect()
    }
}
