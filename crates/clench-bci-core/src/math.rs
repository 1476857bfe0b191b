//! Streaming math utilities
//!
//! [`RollingWindow`] is the fixed-capacity ring buffer backing the clench
//! detector's adaptive baseline.

use alloc::vec;
use alloc::vec::Vec;

/// Fixed-capacity FIFO of `f64` values with a running sum.
///
/// Capacity is chosen at construction and never grows; pushing into a full
/// window evicts the oldest value.
#[derive(Clone, Debug)]
pub struct RollingWindow {
    buffer: Vec<f64>,
    index: usize,
    len: usize,
    sum: f64,
}

impl RollingWindow {
    /// Create an empty window holding at most `capacity` values.
    ///
    /// A capacity of zero is bumped to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![0.0; capacity.max(1)],
            index: 0,
            len: 0,
            sum: 0.0,
        }
    }

    /// Push a value, evicting the oldest one when full.
    ///
    /// Returns the evicted value, if any.
    #[inline]
    pub fn push(&mut self, value: f64) -> Option<f64> {
        let evicted = if self.len == self.buffer.len() {
            let old = self.buffer[self.index];
            self.sum -= old;
            Some(old)
        } else {
            self.len += 1;
            None
        };

        self.buffer[self.index] = value;
        self.sum += value;
        self.index = (self.index + 1) % self.buffer.len();

        // Once per lap, replace the incremental sum so drift cannot build up
        if self.index == 0 {
            self.resync();
        }

        evicted
    }

    /// Mean of the stored values, `0.0` when empty.
    #[inline]
    #[must_use]
    pub fn mean(&self) -> f64 {
        if self.len == 0 {
            0.0
        } else {
            self.sum / self.len as f64
        }
    }

    /// Number of stored values
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the window is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the window holds `capacity` values
    #[inline]
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.len == self.buffer.len()
    }

    fn resync(&mut self) {
        self.sum = self.iter().sum();
    }

    /// Iterate stored values from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        let start = if self.is_full() { self.index } else { 0 };
        (0..self.len).map(move |i| self.buffer[(start + i) % self.buffer.len()])
    }
}
