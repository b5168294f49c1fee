use std::collections::{HashSet, VecDeque};

pub const DEFAULT_RECENCY_CAPACITY: usize = 100;

/// Fixed-capacity FIFO of recently handled ids, used to skip items that were
/// already processed in an earlier polling cycle.
///
/// `members` always holds exactly the ids in `order`. Eviction assumes callers
/// do not `put` the same id twice while it is still present.
#[derive(Debug, Clone)]
pub struct RecencySet {
    order: VecDeque<String>,
    members: HashSet<String>,
    capacity: usize,
}

impl RecencySet {
    pub fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            members: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    pub fn put(&mut self, id: impl Into<String>) {
        if self.order.len() >= self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.members.remove(&evicted);
            }
        }
        let id = id.into();
        self.members.insert(id.clone());
        self.order.push_back(id);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.contains(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for RecencySet {
    fn default() -> Self {
        Self::new(DEFAULT_RECENCY_CAPACITY)
    }
}
