//! Bounded undo history of chain configurations

use std::collections::VecDeque;

/// Number of undo steps kept
pub const HISTORY_CAPACITY: usize = 15;

/// LIFO of snapshots with a fixed capacity.
///
/// Popping an empty history yields the baseline: the state the history was
/// created with, or the oldest retained snapshot once anything was evicted.
#[derive(Debug, Clone)]
pub struct History<T> {
    entries: VecDeque<T>,
    baseline: T,
    capacity: usize,
}

impl<T: Clone> History<T> {
    pub fn new(baseline: T) -> Self {
        Self::with_capacity(baseline, HISTORY_CAPACITY)
    }

    pub fn with_capacity(baseline: T, capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            baseline,
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, snapshot: T) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
            if let Some(oldest) = self.entries.front() {
                self.baseline = oldest.clone();
            }
        }
        self.entries.push_back(snapshot);
    }

    /// Most recent snapshot, or the baseline when nothing is left
    pub fn pop(&mut self) -> T {
        self.entries.pop_back().unwrap_or_else(|| self.baseline.clone())
    }

    pub fn peek(&self) -> Option<&T> {
        self.entries.back()
    }

    pub fn baseline(&self) -> &T {
        &self.baseline
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

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
