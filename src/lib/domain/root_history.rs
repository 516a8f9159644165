use std::collections::VecDeque;

use alloy::primitives::B256;

/// Number of recent roots the destination registry accepts.
pub const ROOT_HISTORY_SIZE: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootEntry {
    pub root: B256,
    pub arrival_order: u64,
}

/// Bounded window of registered roots, oldest first.
#[derive(Debug, Clone)]
pub struct RootHistory {
    entries: VecDeque<RootEntry>,
    capacity: usize,
    next_order: u64,
}

impl RootHistory {
    pub fn new() -> Self {
        Self::with_capacity(ROOT_HISTORY_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            next_order: 0,
        }
    }

    /// Register a root, evicting the oldest one once the window is full.
    /// The zero root is ignored and `None` returned.
    pub fn push(&mut self, root: B256) -> Option<RootEntry> {
        if root.is_zero() {
            return None;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        let entry = RootEntry {
            root,
            arrival_order: self.next_order,
        };
        self.next_order += 1;
        self.entries.push_back(entry);
        Some(entry)
    }

    pub fn contains(&self, root: &B256) -> bool {
        !root.is_zero() && self.entries.iter().any(|e| e.root == *root)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for RootHistory {
    fn default() -> Self {
        Self::new()
    }
}
