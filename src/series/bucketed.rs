//! Bracketed linear regression.
//!
//! Consecutive samples that stay within a small box around the first sample
//! of a bracket are collapsed into a single regression point (the medians of
//! the bracket). A bracket only contributes once it holds enough samples, so
//! transient spikes never become regression points.

use super::{BoundedSeries, OlsLinearSeries};

const X_CUTOFF: f64 = 5.0;
const Y_CUTOFF: f64 = 5.0;
const MINIMUM_VALUES_IN_BRACKET: usize = 6;

#[derive(Debug, Clone)]
pub struct BucketedLinearSeries {
    regression: OlsLinearSeries,
    x_bracket: (f64, f64),
    y_bracket: (f64, f64),
    x_in_bracket: BoundedSeries,
    y_in_bracket: BoundedSeries,
    max_x: f64,
    max_y: f64,
}

impl Default for BucketedLinearSeries {
    fn default() -> Self {
        Self::new()
    }
}

impl BucketedLinearSeries {
    pub fn new() -> Self {
        Self {
            regression: OlsLinearSeries::new(0),
            x_bracket: (0.0, 0.0),
            y_bracket: (0.0, 0.0),
            x_in_bracket: BoundedSeries::unbounded(),
            y_in_bracket: BoundedSeries::unbounded(),
            max_x: 0.0,
            max_y: 0.0,
        }
    }

    pub fn push(&mut self, x: f64, y: f64) {
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);

        let in_bracket = !self.x_in_bracket.is_empty()
            && x >= self.x_bracket.0
            && x <= self.x_bracket.1
            && y >= self.y_bracket.0
            && y <= self.y_bracket.1;

        if in_bracket {
            self.x_in_bracket.push(x);
            self.y_in_bracket.push(y);
        } else {
            self.flush();
            self.x_bracket = (x - X_CUTOFF, x + X_CUTOFF);
            self.y_bracket = (y - Y_CUTOFF, y + Y_CUTOFF);
            self.x_in_bracket.push(x);
            self.y_in_bracket.push(y);
        }
    }

    /// Closes the open bracket, adding it to the regression if it holds enough samples.
    pub fn flush(&mut self) {
        if self.x_in_bracket.len() >= MINIMUM_VALUES_IN_BRACKET {
            self.regression
                .push(self.x_in_bracket.median(), self.y_in_bracket.median());
        }
        self.x_in_bracket.reset();
        self.y_in_bracket.reset();
    }

    /// Number of brackets that made it into the regression.
    pub fn number_of_samples(&self) -> usize {
        self.regression.len()
    }

    pub fn project_x(&self, x: f64) -> f64 {
        self.regression.project_x(x)
    }

    pub fn slope(&self) -> f64 {
        self.regression.slope()
    }

    pub fn goodness_of_fit(&self) -> f64 {
        self.regression.goodness_of_fit()
    }

    pub fn max_encountered_x(&self) -> f64 {
        self.max_x
    }

    pub fn max_encountered_y(&self) -> f64 {
        self.max_y
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_brackets_are_discarded() {
        let mut series = BucketedLinearSeries::new();
        for _ in 0..5 {
            series.push(100.0, 100.0);
        }
        series.push(150.0, 200.0);
        assert_eq!(series.number_of_samples(), 0, "five samples do not make a bracket");
    }

    #[test]
    fn test_brackets_become_regression_points() {
        let mut series = BucketedLinearSeries::new();
        for step in 0..5 {
            let hr = 120.0 + f64::from(step) * 10.0;
            let power = 2.0 * hr - 100.0;
            for _ in 0..8 {
                series.push(hr, power);
            }
        }
        series.flush();
        assert_eq!(series.number_of_samples(), 5);
        assert!((series.slope() - 2.0).abs() < 1e-9);
        assert!((series.project_x(180.0) - 260.0).abs() < 1e-6);
        assert_eq!(series.max_encountered_x(), 160.0);
        assert_eq!(series.max_encountered_y(), 220.0);
    }
}
