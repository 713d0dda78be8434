//! # Delta Queue
//!
//! FIFO of locally produced deltas awaiting transmission. The replica manager
//! keeps two of them: the offline queue, filled while disconnected, and the
//! pending queue, flushed on the debounce timer while connected. Order is
//! preserved across both so the server receives local edits in the order
//! they were made.

use crate::shared::Delta;
use std::collections::VecDeque;

/// Ordered buffer of encoded deltas
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DeltaQueue {
    deltas: VecDeque<Delta>,
}

impl DeltaQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, delta: Delta) {
        self.deltas.push_back(delta);
    }

    /// Put deltas back at the head, keeping their relative order
    pub fn push_front_all(&mut self, deltas: Vec<Delta>) {
        for delta in deltas.into_iter().rev() {
            self.deltas.push_front(delta);
        }
    }

    /// Move every delta of `other` to the back of this queue
    pub fn append(&mut self, other: &mut DeltaQueue) {
        self.deltas.append(&mut other.deltas);
    }

    /// Take every queued delta, oldest first
    pub fn drain(&mut self) -> Vec<Delta> {
        self.deltas.drain(..).collect()
    }

    pub fn clear(&mut self) {
        self.deltas.clear();
    }

    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    /// Total encoded size in bytes
    pub fn byte_len(&self) -> usize {
        self.deltas.iter().map(Vec::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Delta> {
        self.deltas.iter()
    }
}
