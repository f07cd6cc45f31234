//! Trims phase-boundary noise from the ends of a curve.

/// Holds the most recent complete curve after trimming leading and trailing
/// samples at or below `minimum_y`.
#[derive(Debug, Clone)]
pub struct CurveAligner {
    minimum_y: f64,
    last_complete_curve: Vec<f64>,
}

impl CurveAligner {
    pub fn new(minimum_y: f64) -> Self {
        Self {
            minimum_y,
            last_complete_curve: Vec::new(),
        }
    }

    pub fn push(&mut self, curve: &[f64]) {
        let start = curve.iter().position(|v| *v > self.minimum_y);
        let end = curve.iter().rposition(|v| *v > self.minimum_y);
        self.last_complete_curve = match (start, end) {
            (Some(start), Some(end)) => curve[start..=end].to_vec(),
            _ => Vec::new(),
        };
    }

    pub fn last_complete_curve(&self) -> &[f64] {
        &self.last_complete_curve
    }

    pub fn reset(&mut self) {
        self.last_complete_curve.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trims_both_ends_only() {
        let mut aligner = CurveAligner::new(5.0);
        aligner.push(&[0.0, 2.0, 10.0, 3.0, 20.0, 1.0, 0.0]);
        assert_eq!(aligner.last_complete_curve(), &[10.0, 3.0, 20.0], "interior dips are kept");
    }

    #[test]
    fn test_all_noise_yields_empty_curve() {
        let mut aligner = CurveAligner::new(5.0);
        aligner.push(&[1.0, 5.0, 0.0]);
        assert!(aligner.last_complete_curve().is_empty());
        aligner.push(&[]);
        assert!(aligner.last_complete_curve().is_empty());
    }
}
