//! Bounded buffer of recent temperature readings.

use std::collections::VecDeque;

/// FIFO window over the most recent readings. Pushing past capacity evicts
/// the oldest sample.
#[derive(Debug, Clone)]
pub struct TemperatureBuffer {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl TemperatureBuffer {
    /// A buffer holding at most `capacity` samples (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, celsius: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(celsius);
    }

    pub fn latest(&self) -> Option<f64> {
        self.samples.back().copied()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples oldest first.
    pub fn to_vec(&self) -> Vec<f64> {
        self.samples.iter().copied().collect()
    }
}
