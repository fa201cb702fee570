//! Bounded set of recently seen message ids
//!
//! Used by every live consumer to suppress redelivered bus events. Eviction is
//! coarse: once more than `capacity` ids are held, everything but the newest
//! `retain` ids is dropped at once. An id evicted that way will be reported as
//! new again if it is redelivered later.

use std::collections::{HashSet, VecDeque};

pub const DEFAULT_DEDUP_CAPACITY: usize = 100;
pub const DEFAULT_DEDUP_RETAIN: usize = 50;

#[derive(Debug)]
pub struct DedupCache {
    capacity: usize,
    retain: usize,
    order: VecDeque<String>,
    seen: HashSet<String>,
}

impl DedupCache {
    pub fn new(capacity: usize, retain: usize) -> Self {
        let retain = retain.min(capacity);
        Self {
            capacity,
            retain,
            order: VecDeque::with_capacity(capacity + 1),
            seen: HashSet::with_capacity(capacity + 1),
        }
    }

    /// Records `id` and returns `true` if it was not already held
    pub fn check_and_insert(&mut self, id: &str) -> bool {
        if self.seen.contains(id) {
            return false;
        }
        self.seen.insert(id.to_string());
        self.order.push_back(id.to_string());

        if self.order.len() > self.capacity {
            let drop_count = self.order.len() - self.retain;
            for evicted in self.order.drain(..drop_count) {
                self.seen.remove(&evicted);
            }
        }
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_CAPACITY, DEFAULT_DEDUP_RETAIN)
    }
}
