//! Priority queue for pending operations.

use std::collections::VecDeque;

use crate::OperationPriority;

#[derive(Debug)]
struct Entry<T> {
    priority: OperationPriority,
    item: T,
}

/// Pending operations ordered by priority (descending), then submission order.
///
/// Insertion is O(n) with the queue kept sorted, so `pop` is always the front.
#[derive(Debug)]
pub struct OperationQueue<T> {
    entries: VecDeque<Entry<T>>,
}

impl<T> OperationQueue<T> {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Insert in priority order (higher priority first, then FIFO within priority)
    pub fn push(&mut self, priority: OperationPriority, item: T) {
        // Strictly greater: equal priorities stay behind older submissions
        let insert_pos = self
            .entries
            .iter()
            .position(|existing| priority > existing.priority)
            .unwrap_or(self.entries.len());

        self.entries.insert(insert_pos, Entry { priority, item });
    }

    /// Take the highest-priority, oldest item
    pub fn pop(&mut self) -> Option<T> {
        self.entries.pop_front().map(|entry| entry.item)
    }

    /// Remove every pending item, in execution order
    pub fn drain(&mut self) -> Vec<T> {
        self.entries.drain(..).map(|entry| entry.item).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate pending items in execution order
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(|entry| &entry.item)
    }
}

impl<T> Default for OperationQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
