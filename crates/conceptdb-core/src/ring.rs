//! Bounded append-only log.
//!
//! [`BoundedLog`] is the ring buffer behind the decision log, the sync change
//! log, checkpoint retention, and evolution history. Appending to a full log
//! evicts the oldest entry; entries are never mutated in place.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// A fixed-capacity FIFO log that evicts its oldest entry when full.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundedLog<T> {
    capacity: usize,
    entries: VecDeque<T>,
    evicted: u64,
}

impl<T> BoundedLog<T> {
    /// Create a log holding at most `capacity` entries.
    ///
    /// A capacity of zero is treated as one so the most recent entry is
    /// always observable.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity.min(1024)),
            evicted: 0,
        }
    }

    /// Append an entry, returning the evicted one if the log was full.
    pub fn push(&mut self, entry: T) -> Option<T> {
        let evicted = if self.entries.len() == self.capacity {
            self.evicted += 1;
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(entry);
        evicted
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of retained entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total number of entries evicted over the log's lifetime.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Most recently appended entry.
    pub fn latest(&self) -> Option<&T> {
        self.entries.back()
    }

    /// Iterate oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.entries.iter()
    }

    /// Clone the last `n` entries, oldest first.
    pub fn tail(&self, n: usize) -> Vec<T>
    where
        T: Clone,
    {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }
}
