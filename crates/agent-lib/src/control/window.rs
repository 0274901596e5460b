//! Fixed-capacity boolean window
//!
//! Keeps the trailing `capacity` observations of a trigger condition with a
//! running count of `true` values, so the decision engine can ask for
//! sustained evidence instead of reacting to a single noisy sample.

use std::collections::VecDeque;

/// FIFO window of boolean observations
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    values: VecDeque<bool>,
    capacity: usize,
    /// Number of `true` values currently held
    count: usize,
}

impl SlidingWindow {
    /// Create an empty window; a zero capacity is raised to one
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
            count: 0,
        }
    }

    /// Append an observation, evicting the oldest when at capacity
    pub fn push(&mut self, value: bool) {
        if self.values.len() == self.capacity {
            if let Some(true) = self.values.pop_front() {
                self.count -= 1;
            }
        }

        self.values.push_back(value);
        if value {
            self.count += 1;
        }
    }

    pub fn is_full(&self) -> bool {
        self.values.len() == self.capacity
    }

    /// Number of `true` observations in the window
    pub fn sum(&self) -> usize {
        self.count
    }

    /// True iff the window is full and every observation is `true`
    pub fn all(&self) -> bool {
        self.is_full() && self.count == self.capacity
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_len_never_exceeds_capacity() {
        let mut window = SlidingWindow::new(12);

        for i in 0..50 {
            window.push(i % 3 == 0);
            assert!(window.len() <= window.capacity());
            assert!(window.sum() <= window.len());
        }
        assert!(window.is_full());
    }

    #[test]
    fn test_oldest_value_is_evicted() {
        let mut window = SlidingWindow::new(12);

        window.push(true);
        for _ in 0..11 {
            window.push(false);
        }
        assert_eq!(window.sum(), 1);

        // Pushing capacity + 1 values drops the first one
        window.push(false);
        assert_eq!(window.sum(), 0);
        assert_eq!(window.len(), 12);
    }

    #[test]
    fn test_all_requires_full_window() {
        let mut window = SlidingWindow::new(3);

        window.push(true);
        window.push(true);
        assert!(!window.all());

        window.push(true);
        assert!(window.all());

        window.push(false);
        assert!(!window.all());
        assert_eq!(window.sum(), 2);
    }

    #[test]
    fn test_running_count_matches_contents() {
        let mut window = SlidingWindow::new(5);
        let pattern = [true, true, false, true, false, false, true, true, true];

        for (i, value) in pattern.iter().enumerate() {
            window.push(*value);
            let start = (i + 1).saturating_sub(5);
            let expected = pattern[start..=i].iter().filter(|v| **v).count();
            assert_eq!(window.sum(), expected);
        }
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let mut window = SlidingWindow::new(0);
        assert_eq!(window.capacity(), 1);

        window.push(true);
        window.push(false);
        assert_eq!(window.len(), 1);
        assert_eq!(window.sum(), 0);
    }
}
