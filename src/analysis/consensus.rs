//! Sliding-window consensus over streaming recognition results
//!
//! Keeps the last `W` results and reports when they all agree. The window is
//! not synchronised; the engine serialises every access to it.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// How many consecutive matching results are required before a value is reported
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionReliability {
    /// Last three results must match
    #[default]
    Verifiable,
    /// Last four results must match
    Stable,
    /// Last five results must match
    Solid,
}

impl RecognitionReliability {
    /// Window size W for this tier
    pub fn window_size(self) -> usize {
        match self {
            RecognitionReliability::Verifiable => 3,
            RecognitionReliability::Stable => 4,
            RecognitionReliability::Solid => 5,
        }
    }
}

/// Bounded FIFO of the most recent recognition results
#[derive(Debug, Clone)]
pub struct ConsensusQueue<T> {
    values: VecDeque<T>,
    capacity: usize,
}

impl<T: PartialEq> ConsensusQueue<T> {
    /// Create an empty window holding at most `capacity` values
    ///
    /// A capacity of zero is raised to one so the window can always settle.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Create an empty window sized for a reliability tier
    pub fn with_reliability(reliability: RecognitionReliability) -> Self {
        Self::new(reliability.window_size())
    }

    /// Create a window pre-filled with `values`, keeping only the newest `capacity`
    pub fn with_values(capacity: usize, values: impl IntoIterator<Item = T>) -> Self {
        let mut queue = Self::new(capacity);
        for value in values {
            queue.enqueue(value);
        }
        queue
    }

    /// Append a value, evicting the oldest one when the window overflows
    pub fn enqueue(&mut self, value: T) {
        self.values.push_back(value);
        if self.values.len() > self.capacity {
            self.values.pop_front();
        }
    }

    /// True when the window is full and every value equals every other
    pub fn settled(&self) -> bool {
        if self.values.len() != self.capacity {
            return false;
        }
        match self.values.front() {
            Some(first) => self.values.iter().all(|v| v == first),
            None => false,
        }
    }

    /// Remove and return the oldest value
    pub fn take(&mut self) -> Option<T> {
        self.values.pop_front()
    }

    /// Empty the window
    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Values from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.values.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(queue: &ConsensusQueue<&'static str>) -> Vec<&'static str> {
        queue.iter().copied().collect()
    }

    #[test]
    fn test_reliability_window_sizes() {
        assert_eq!(RecognitionReliability::Verifiable.window_size(), 3);
        assert_eq!(RecognitionReliability::Stable.window_size(), 4);
        assert_eq!(RecognitionReliability::Solid.window_size(), 5);
        assert!(RecognitionReliability::Verifiable < RecognitionReliability::Solid);
    }

    #[test]
    fn test_queue_maintains_size() {
        let mut queue = ConsensusQueue::with_values(5, [1, 2, 3, 4, 5]);
        queue.enqueue(6);
        assert_eq!(queue.len(), 5);
        assert_eq!(queue.iter().copied().collect::<Vec<_>>(), vec![2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_seed_keeps_newest_values() {
        let queue = ConsensusQueue::with_values(3, [1, 2, 3, 4]);
        assert_eq!(queue.len(), queue.capacity());
        assert_eq!(queue.iter().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let mut queue = ConsensusQueue::new(4);
        for i in 0..50 {
            queue.enqueue(i % 7);
            assert!(queue.len() <= 4);
        }
    }

    #[test]
    fn test_settles_on_matching_window() {
        let mut queue = ConsensusQueue::with_reliability(RecognitionReliability::Verifiable);
        queue.enqueue("A");
        queue.enqueue("A");
        assert!(!queue.settled());
        queue.enqueue("A");
        assert!(queue.settled());

        queue.enqueue("B");
        assert_eq!(contents(&queue), vec!["A", "A", "B"]);
        assert!(!queue.settled());
    }

    #[test]
    fn test_comparison_is_exact() {
        let queue = ConsensusQueue::with_values(3, ["cat", "cat", "Cat"]);
        assert!(!queue.settled());
        let queue = ConsensusQueue::with_values(3, ["cat", "cat ", "cat"]);
        assert!(!queue.settled());
    }

    #[test]
    fn test_clear_then_partial_never_settles() {
        let mut queue = ConsensusQueue::with_values(3, ["A", "A", "A"]);
        assert!(queue.settled());
        queue.clear();
        assert!(queue.is_empty());
        queue.enqueue("A");
        queue.enqueue("A");
        assert!(!queue.settled());
    }

    #[test]
    fn test_take_returns_oldest() {
        let mut queue = ConsensusQueue::with_values(5, [1, 2, 3, 4, 5]);
        assert_eq!(queue.take(), Some(1));
        assert_eq!(queue.len(), 4);
    }

    #[test]
    fn test_take_on_empty() {
        let mut queue = ConsensusQueue::with_values(1, [1]);
        queue.take();
        assert_eq!(queue.take(), None);
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let mut queue = ConsensusQueue::new(0);
        assert_eq!(queue.capacity(), 1);
        queue.enqueue("only");
        assert!(queue.settled());
    }

    #[test]
    fn test_reliability_serde_names() {
        let json = serde_json::to_string(&RecognitionReliability::Stable).unwrap();
        assert_eq!(json, "\"stable\"");
        let parsed: RecognitionReliability = serde_json::from_str("\"solid\"").unwrap();
        assert_eq!(parsed, RecognitionReliability::Solid);
    }
}
