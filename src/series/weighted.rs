//! Weighted average accumulator.

use super::BoundedSeries;

/// Bounded series of (value, weight) pairs.
///
/// Used to combine several estimates of the same quantity, each weighted by
/// how well the regression that produced it fitted its data.
#[derive(Debug, Clone)]
pub struct WeightedSeries {
    values: BoundedSeries,
    weights: BoundedSeries,
    weighted: BoundedSeries,
    default_value: f64,
}

impl WeightedSeries {
    pub fn new(max_len: usize, default_value: f64) -> Self {
        Self {
            values: BoundedSeries::new(max_len),
            weights: BoundedSeries::new(max_len),
            weighted: BoundedSeries::new(max_len),
            default_value,
        }
    }

    pub fn push(&mut self, value: f64, weight: f64) {
        self.values.push(value);
        self.weights.push(weight);
        self.weighted.push(value * weight);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Σ(v·w)/Σw, or the default when empty or all weights are zero.
    pub fn weighted_average(&self) -> f64 {
        let total_weight = self.weights.sum();
        if self.values.is_empty() || total_weight == 0.0 {
            return self.default_value;
        }
        self.weighted.sum() / total_weight
    }

    pub fn reset(&mut self) {
        self.values.reset();
        self.weights.reset();
        self.weighted.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weighted_average() {
        let mut series = WeightedSeries::new(5, 0.0);
        series.push(10.0, 1.0);
        series.push(20.0, 3.0);
        assert!((series.weighted_average() - 17.5).abs() < 1e-12);
    }

    #[test]
    fn test_default_when_empty_or_weightless() {
        let mut series = WeightedSeries::new(3, 7.0);
        assert_eq!(series.weighted_average(), 7.0);
        series.push(100.0, 0.0);
        assert_eq!(series.weighted_average(), 7.0, "zero total weight falls back to the default");
    }

    #[test]
    fn test_window_bounds_history() {
        let mut series = WeightedSeries::new(2, 0.0);
        series.push(1.0, 1.0);
        series.push(2.0, 1.0);
        series.push(3.0, 1.0);
        assert_eq!(series.len(), 2);
        assert!((series.weighted_average() - 2.5).abs() < 1e-12);
        series.reset();
        assert!(series.is_empty());
    }
}
