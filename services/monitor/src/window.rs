//! Bounded rolling window over recent observations
//!
//! A fixed-capacity, insertion-ordered FIFO: pushing beyond capacity
//! evicts the oldest element. Owned exclusively by the component that
//! writes it; one window per symbol per data kind.

use std::collections::VecDeque;

/// Fixed-capacity FIFO buffer of recent observations.
#[derive(Debug, Clone)]
pub struct RollingWindow<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> RollingWindow<T> {
    /// Create a window holding at most `capacity` elements.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "RollingWindow capacity must be non-zero");
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an observation, evicting the oldest if at capacity.
    pub fn push(&mut self, item: T) {
        if self.items.len() >= self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    /// Number of elements currently held.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the window holds no elements.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Maximum number of elements.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recently pushed element.
    pub fn last(&self) -> Option<&T> {
        self.items.back()
    }

    /// Iterate oldest-first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// The most recent `n` elements, oldest-first.
    pub fn last_n(&self, n: usize) -> impl Iterator<Item = &T> {
        let skip = self.items.len().saturating_sub(n);
        self.items.iter().skip(skip)
    }
}
