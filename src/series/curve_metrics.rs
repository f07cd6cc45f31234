//! Per-phase curve accumulator (handle force, velocity, power).

/// Collects one sample per impulse during a drive phase and tracks its peak
/// and time-weighted average.
///
/// Non-positive samples are stored as 0 so the curve keeps one entry per
/// impulse, but they do not count towards the average.
#[derive(Debug, Clone, Default)]
pub struct CurveMetrics {
    curve: Vec<f64>,
    peak: f64,
    weighted_sum: f64,
    total_time: f64,
}

impl CurveMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sample that was valid for `delta_time` seconds.
    pub fn push(&mut self, delta_time: f64, value: f64) {
        if value > 0.0 && value.is_finite() {
            self.curve.push(value);
            self.peak = self.peak.max(value);
            if delta_time > 0.0 && delta_time.is_finite() {
                self.weighted_sum += delta_time * value;
                self.total_time += delta_time;
            }
        } else {
            self.curve.push(0.0);
        }
    }

    pub fn peak(&self) -> f64 {
        self.peak
    }

    /// Time-weighted average of the positive samples, 0 when none.
    pub fn average(&self) -> f64 {
        if self.total_time > 0.0 {
            self.weighted_sum / self.total_time
        } else {
            0.0
        }
    }

    pub fn curve(&self) -> &[f64] {
        &self.curve
    }

    pub fn len(&self) -> usize {
        self.curve.len()
    }

    pub fn is_empty(&self) -> bool {
        self.curve.is_empty()
    }

    pub fn reset(&mut self) {
        self.curve.clear();
        self.peak = 0.0;
        self.weighted_sum = 0.0;
        self.total_time = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peak_and_time_weighted_average() {
        let mut metrics = CurveMetrics::new();
        metrics.push(0.1, 100.0);
        metrics.push(0.3, 200.0);
        assert_eq!(metrics.peak(), 200.0);
        assert!((metrics.average() - 175.0).abs() < 1e-9);
        assert_eq!(metrics.curve(), &[100.0, 200.0]);
    }

    #[test]
    fn test_non_positive_samples_stored_as_zero() {
        let mut metrics = CurveMetrics::new();
        metrics.push(0.1, -5.0);
        metrics.push(0.1, 50.0);
        metrics.push(0.1, f64::NAN);
        assert_eq!(metrics.curve(), &[0.0, 50.0, 0.0]);
        assert!((metrics.average() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_reset() {
        let mut metrics = CurveMetrics::new();
        metrics.push(0.1, 10.0);
        metrics.reset();
        assert!(metrics.is_empty());
        assert_eq!(metrics.peak(), 0.0);
        assert_eq!(metrics.average(), 0.0);
    }
}
