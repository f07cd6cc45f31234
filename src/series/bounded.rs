//! Bounded sliding-window series.

use std::collections::VecDeque;

/// A FIFO window of at most `max_len` values.
///
/// A `max_len` of 0 means the series is unbounded. Pushing into a full
/// series evicts the oldest value first.
#[derive(Debug, Clone, Default)]
pub struct BoundedSeries {
    max_len: usize,
    values: VecDeque<f64>,
}

impl BoundedSeries {
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len,
            values: VecDeque::with_capacity(max_len),
        }
    }

    /// Unbounded series, grows with every push.
    pub fn unbounded() -> Self {
        Self::new(0)
    }

    pub fn push(&mut self, value: f64) {
        if self.max_len > 0 && self.values.len() >= self.max_len {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// True once the window holds `max_len` values (never for unbounded series).
    pub fn is_full(&self) -> bool {
        self.max_len > 0 && self.values.len() >= self.max_len
    }

    pub fn get(&self, position: usize) -> Option<f64> {
        self.values.get(position).copied()
    }

    /// Oldest value, 0 when empty.
    pub fn at_series_begin(&self) -> f64 {
        self.values.front().copied().unwrap_or(0.0)
    }

    /// Newest value, 0 when empty.
    pub fn at_series_end(&self) -> f64 {
        self.values.back().copied().unwrap_or(0.0)
    }

    /// Number of values strictly above `threshold`.
    pub fn number_of_values_above(&self, threshold: f64) -> usize {
        self.values.iter().filter(|v| **v > threshold).count()
    }

    /// Number of values at or below `threshold`.
    pub fn number_of_values_equal_or_below(&self, threshold: f64) -> usize {
        self.values.iter().filter(|v| **v <= threshold).count()
    }

    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Arithmetic mean, 0 when empty.
    pub fn average(&self) -> f64 {
        if self.values.is_empty() {
            0.0
        } else {
            self.sum() / self.values.len() as f64
        }
    }

    /// Smallest value, 0 when empty.
    pub fn minimum(&self) -> f64 {
        self.values
            .iter()
            .copied()
            .reduce(f64::min)
            .unwrap_or(0.0)
    }

    /// Largest value, 0 when empty.
    pub fn maximum(&self) -> f64 {
        self.values
            .iter()
            .copied()
            .reduce(f64::max)
            .unwrap_or(0.0)
    }

    /// Median over a sorted copy of the window, 0 when empty.
    pub fn median(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let mut sorted: Vec<f64> = self.values.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied()
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.values.iter().copied().collect()
    }

    pub fn reset(&mut self) {
        self.values.clear();
    }
}
