//! Ordinary least squares regression over a bounded window.
//!
//! Running sums of x, x², y, y² and xy are kept as bounded series so that the
//! closed-form fit can be recomputed after every push without rescanning
//! history beyond the window.

use tracing::error;

use super::BoundedSeries;

#[derive(Debug, Clone)]
pub struct OlsLinearSeries {
    x: BoundedSeries,
    xx: BoundedSeries,
    y: BoundedSeries,
    yy: BoundedSeries,
    xy: BoundedSeries,
    slope: f64,
    intercept: f64,
    goodness_of_fit: f64,
}

impl OlsLinearSeries {
    /// Window of `max_len` points; 0 keeps every point.
    pub fn new(max_len: usize) -> Self {
        Self {
            x: BoundedSeries::new(max_len),
            xx: BoundedSeries::new(max_len),
            y: BoundedSeries::new(max_len),
            yy: BoundedSeries::new(max_len),
            xy: BoundedSeries::new(max_len),
            slope: 0.0,
            intercept: 0.0,
            goodness_of_fit: 0.0,
        }
    }

    pub fn push(&mut self, x: f64, y: f64) {
        self.x.push(x);
        self.xx.push(x * x);
        self.y.push(y);
        self.yy.push(y * y);
        self.xy.push(x * y);
        self.refit();
    }

    fn refit(&mut self) {
        let n = self.x.len() as f64;
        if self.x.len() < 2 {
            self.slope = 0.0;
            self.intercept = 0.0;
            self.goodness_of_fit = 0.0;
            return;
        }

        let sum_x = self.x.sum();
        let sum_y = self.y.sum();
        let sum_xx = self.xx.sum();
        let sum_yy = self.yy.sum();
        let sum_xy = self.xy.sum();

        let denominator = n * sum_xx - sum_x * sum_x;
        if denominator.abs() < f64::EPSILON {
            self.slope = 0.0;
            self.intercept = 0.0;
            self.goodness_of_fit = 0.0;
            return;
        }

        self.slope = (n * sum_xy - sum_x * sum_y) / denominator;
        self.intercept = (sum_y - self.slope * sum_x) / n;

        let sse = sum_yy - self.intercept * sum_y - self.slope * sum_xy;
        let sst = sum_yy - (sum_y * sum_y) / n;
        self.goodness_of_fit = if sst <= 0.0 {
            // All y identical: a horizontal line explains them exactly
            if sse.abs() <= f64::EPSILON * sum_yy.abs().max(1.0) {
                1.0
            } else {
                0.0
            }
        } else {
            (1.0 - sse / sst).clamp(0.0, 1.0)
        };
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn slope(&self) -> f64 {
        self.slope
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    /// R² of the current fit, in [0, 1].
    pub fn goodness_of_fit(&self) -> f64 {
        self.goodness_of_fit
    }

    /// y on the fitted line at `x`; 0 with fewer than two points.
    pub fn project_x(&self, x: f64) -> f64 {
        if self.x.len() < 2 {
            return 0.0;
        }
        self.slope * x + self.intercept
    }

    /// x on the fitted line for `y`; 0 with fewer than two points or a flat line.
    pub fn project_y(&self, y: f64) -> f64 {
        if self.x.len() < 2 || self.slope == 0.0 {
            error!(
                points = self.x.len(),
                slope = self.slope,
                "Unable to project x for y: regression has no usable slope"
            );
            return 0.0;
        }
        (y - self.intercept) / self.slope
    }

    pub fn x_at_series_begin(&self) -> f64 {
        self.x.at_series_begin()
    }

    pub fn x_at_series_end(&self) -> f64 {
        self.x.at_series_end()
    }

    pub fn y_at_series_begin(&self) -> f64 {
        self.y.at_series_begin()
    }

    pub fn y_at_series_end(&self) -> f64 {
        self.y.at_series_end()
    }

    pub fn x_series(&self) -> &BoundedSeries {
        &self.x
    }

    pub fn y_series(&self) -> &BoundedSeries {
        &self.y
    }

    pub fn number_of_y_values_above(&self, threshold: f64) -> usize {
        self.y.number_of_values_above(threshold)
    }

    pub fn number_of_y_values_equal_or_below(&self, threshold: f64) -> usize {
        self.y.number_of_values_equal_or_below(threshold)
    }

    pub fn reset(&mut self) {
        self.x.reset();
        self.xx.reset();
        self.y.reset();
        self.yy.reset();
        self.xy.reset();
        self.slope = 0.0;
        self.intercept = 0.0;
        self.goodness_of_fit = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_exact_line_fit() {
        let mut ols = OlsLinearSeries::new(7);
        for x in 0..10 {
            let x = f64::from(x);
            ols.push(x, 3.0 * x - 6.0);
            if ols.len() >= 2 {
                assert!(approx(ols.slope(), 3.0), "slope = {}", ols.slope());
                assert!(approx(ols.intercept(), -6.0), "intercept = {}", ols.intercept());
                assert!(approx(ols.goodness_of_fit(), 1.0), "gof = {}", ols.goodness_of_fit());
            }
        }
        assert_eq!(ols.len(), 7, "window is bounded");
    }

    #[test]
    fn test_degenerate_with_fewer_than_two_points() {
        let mut ols = OlsLinearSeries::new(5);
        assert_eq!(ols.slope(), 0.0);
        ols.push(1.0, 5.0);
        assert_eq!(ols.slope(), 0.0);
        assert_eq!(ols.intercept(), 0.0);
        assert_eq!(ols.goodness_of_fit(), 0.0);
        assert_eq!(ols.project_x(10.0), 0.0);
        assert_eq!(ols.project_y(10.0), 0.0);
    }

    #[test]
    fn test_identical_x_values_do_not_divide_by_zero() {
        let mut ols = OlsLinearSeries::new(5);
        ols.push(2.0, 1.0);
        ols.push(2.0, 3.0);
        assert_eq!(ols.slope(), 0.0);
        assert!(ols.goodness_of_fit().is_finite());
    }

    #[test]
    fn test_projections() {
        let mut ols = OlsLinearSeries::new(0);
        ols.push(0.0, 1.0);
        ols.push(1.0, 3.0);
        ols.push(2.0, 5.0);
        assert!(approx(ols.project_x(4.0), 9.0));
        assert!(approx(ols.project_y(9.0), 4.0));
    }

    #[test]
    fn test_project_y_on_flat_line_is_zero() {
        let mut ols = OlsLinearSeries::new(0);
        ols.push(0.0, 2.0);
        ols.push(1.0, 2.0);
        assert_eq!(ols.slope(), 0.0);
        assert_eq!(ols.project_y(2.0), 0.0);
    }

    #[test]
    fn test_noisy_fit_has_partial_goodness() {
        let mut ols = OlsLinearSeries::new(0);
        for (x, y) in [(0.0, 0.0), (1.0, 2.0), (2.0, 1.0), (3.0, 4.0), (4.0, 3.0)] {
            ols.push(x, y);
        }
        let gof = ols.goodness_of_fit();
        assert!(gof > 0.0 && gof < 1.0, "gof = {gof}");
        assert!(ols.slope() > 0.0);
    }

    #[test]
    fn test_series_accessors_and_counts() {
        let mut ols = OlsLinearSeries::new(3);
        for (x, y) in [(1.0, 0.1), (2.0, 0.2), (3.0, 0.3), (4.0, 0.4)] {
            ols.push(x, y);
        }
        assert_eq!(ols.x_at_series_begin(), 2.0);
        assert_eq!(ols.y_at_series_end(), 0.4);
        assert_eq!(ols.number_of_y_values_above(0.25), 2);
        assert_eq!(ols.number_of_y_values_equal_or_below(0.25), 1);
        ols.reset();
        assert!(ols.is_empty());
        assert_eq!(ols.slope(), 0.0);
    }
}
