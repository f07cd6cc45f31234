//! Robust quadratic regression over a bounded window.
//!
//! The quadratic coefficient is the median of the coefficients of every
//! parabola through three buffered points (Theil-Sen style), so a single
//! torn or double-counted sensor edge cannot swing it. The linear and
//! constant terms are then fitted by least squares over the residual
//! `y - a·x²`.
//!
//! Every triple is labelled with the x of its oldest point. When that point
//! leaves the window, all triples it took part in are dropped with it.

use std::collections::VecDeque;

use tracing::error;

use super::{BoundedSeries, OlsLinearSeries};

#[derive(Debug, Clone)]
pub struct TsQuadraticSeries {
    max_len: usize,
    x: BoundedSeries,
    y: BoundedSeries,
    /// (x of the oldest point of the triple, quadratic coefficient)
    triples: VecDeque<(f64, f64)>,
    a: f64,
    b: f64,
    c: f64,
    goodness_of_fit: f64,
}

impl TsQuadraticSeries {
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len,
            x: BoundedSeries::new(max_len),
            y: BoundedSeries::new(max_len),
            triples: VecDeque::new(),
            a: 0.0,
            b: 0.0,
            c: 0.0,
            goodness_of_fit: 0.0,
        }
    }

    pub fn push(&mut self, x: f64, y: f64) {
        if self.max_len > 0 && self.x.len() >= self.max_len {
            let expiring = self.x.at_series_begin();
            self.triples.retain(|(label, _)| *label != expiring);
        }

        self.x.push(x);
        self.y.push(y);

        let len = self.x.len();
        if len >= 3 {
            let newest = len - 1;
            for i in 0..newest - 1 {
                for j in (i + 1)..newest {
                    let a = self.coefficient_for_triple(i, j, newest);
                    self.triples.push_back((self.x_at(i), a));
                }
            }
        }

        self.refit();
    }

    fn x_at(&self, position: usize) -> f64 {
        self.x.get(position).unwrap_or(0.0)
    }

    fn y_at(&self, position: usize) -> f64 {
        self.y.get(position).unwrap_or(0.0)
    }

    /// Quadratic coefficient of the parabola through three buffered points.
    fn coefficient_for_triple(&self, first: usize, second: usize, third: usize) -> f64 {
        let (x1, y1) = (self.x_at(first), self.y_at(first));
        let (x2, y2) = (self.x_at(second), self.y_at(second));
        let (x3, y3) = (self.x_at(third), self.y_at(third));

        let denominator = (x1 - x2) * (x1 - x3) * (x2 - x3);
        if denominator == 0.0 {
            error!(x1, x2, x3, "Quadratic coefficient undefined: duplicate x values in window");
            return 0.0;
        }
        (x1 * (y3 - y2) + y1 * (x2 - x3) + (x3 * y2 - x2 * y3)) / denominator
    }

    fn refit(&mut self) {
        if self.x.len() < 3 {
            self.a = 0.0;
            self.b = 0.0;
            self.c = 0.0;
            self.goodness_of_fit = 0.0;
            return;
        }

        let mut coefficients: Vec<f64> = self.triples.iter().map(|(_, a)| *a).collect();
        coefficients.sort_by(f64::total_cmp);
        let mid = coefficients.len() / 2;
        self.a = if coefficients.is_empty() {
            0.0
        } else if coefficients.len() % 2 == 0 {
            (coefficients[mid - 1] + coefficients[mid]) / 2.0
        } else {
            coefficients[mid]
        };

        let mut residual = OlsLinearSeries::new(0);
        for (x, y) in self.x.iter().zip(self.y.iter()) {
            residual.push(x, y - self.a * x * x);
        }
        self.b = residual.slope();
        self.c = residual.intercept();

        let mean_y = self.y.average();
        let mut sse = 0.0;
        let mut sst = 0.0;
        for (x, y) in self.x.iter().zip(self.y.iter()) {
            sse += (y - self.project_x(x)).powi(2);
            sst += (y - mean_y).powi(2);
        }
        self.goodness_of_fit = if sse == 0.0 {
            1.0
        } else if sse > sst {
            0.0
        } else if sst == 0.0 {
            0.0
        } else {
            1.0 - sse / sst
        };
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn coefficient_a(&self) -> f64 {
        self.a
    }

    pub fn coefficient_b(&self) -> f64 {
        self.b
    }

    pub fn coefficient_c(&self) -> f64 {
        self.c
    }

    pub fn goodness_of_fit(&self) -> f64 {
        self.goodness_of_fit
    }

    /// Fitted y at `x`.
    pub fn project_x(&self, x: f64) -> f64 {
        self.a * x * x + self.b * x + self.c
    }

    /// dy/dx at the buffered point `position`, 0 until three points exist.
    pub fn first_derivative_at_position(&self, position: usize) -> f64 {
        if self.x.len() < 3 || position >= self.x.len() {
            return 0.0;
        }
        2.0 * self.a * self.x_at(position) + self.b
    }

    /// d²y/dx², constant for a parabola; 0 until three points exist.
    pub fn second_derivative_at_position(&self, position: usize) -> f64 {
        if self.x.len() < 3 || position >= self.x.len() {
            return 0.0;
        }
        2.0 * self.a
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

    pub fn reset(&mut self) {
        self.x.reset();
        self.y.reset();
        self.triples.clear();
        self.a = 0.0;
        self.b = 0.0;
        self.c = 0.0;
        self.goodness_of_fit = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parabola(x: f64) -> f64 {
        2.0 * x * x + 2.0 * x + 2.0
    }

    #[test]
    fn test_exact_parabola_recovers_coefficients() {
        let mut q = TsQuadraticSeries::new(7);
        for i in 0..12 {
            let x = f64::from(i) * 0.5;
            q.push(x, parabola(x));
        }
        assert!((q.coefficient_a() - 2.0).abs() < 1e-6, "a = {}", q.coefficient_a());
        assert!((q.coefficient_b() - 2.0).abs() < 1e-6, "b = {}", q.coefficient_b());
        assert!((q.coefficient_c() - 2.0).abs() < 1e-6, "c = {}", q.coefficient_c());
        assert!((q.goodness_of_fit() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_triples_expire_with_window() {
        let mut q = TsQuadraticSeries::new(5);
        for i in 0..20 {
            let x = f64::from(i);
            q.push(x, parabola(x));
        }
        // C(5,3) triples live in a full window of five points
        assert_eq!(q.triples.len(), 10);
        assert_eq!(q.len(), 5);
    }

    #[test]
    fn test_derivatives() {
        let mut q = TsQuadraticSeries::new(6);
        for i in 0..6 {
            let x = f64::from(i);
            q.push(x, parabola(x));
        }
        // x at position 0 is 0: y' = 4x + 2
        assert!((q.first_derivative_at_position(0) - 2.0).abs() < 1e-6);
        assert!((q.first_derivative_at_position(5) - 22.0).abs() < 1e-6);
        assert!((q.second_derivative_at_position(3) - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_derivatives_zero_before_three_points() {
        let mut q = TsQuadraticSeries::new(6);
        q.push(0.0, 1.0);
        q.push(1.0, 2.0);
        assert_eq!(q.first_derivative_at_position(0), 0.0);
        assert_eq!(q.second_derivative_at_position(0), 0.0);
    }

    #[test]
    fn test_single_outlier_does_not_move_quadratic_term() {
        let mut q = TsQuadraticSeries::new(7);
        for i in 0..7 {
            let x = f64::from(i);
            let y = if i == 3 { parabola(x) * 1.4 } else { parabola(x) };
            q.push(x, y);
        }
        assert!(
            (q.coefficient_a() - 2.0).abs() < 1e-6,
            "median of triples must ignore the outlier, a = {}",
            q.coefficient_a()
        );
        // Outlier sits at the mean x, so it only shifts the intercept
        assert!((q.coefficient_b() - 2.0).abs() < 1e-6, "b = {}", q.coefficient_b());
        assert!(q.goodness_of_fit() < 1.0);
    }

    #[test]
    fn test_duplicate_x_yields_zero_coefficient() {
        let mut q = TsQuadraticSeries::new(3);
        q.push(1.0, 1.0);
        q.push(1.0, 2.0);
        q.push(2.0, 3.0);
        assert_eq!(q.coefficient_a(), 0.0);
    }

    #[test]
    fn test_reset() {
        let mut q = TsQuadraticSeries::new(4);
        for i in 0..4 {
            q.push(f64::from(i), parabola(f64::from(i)));
        }
        q.reset();
        assert!(q.is_empty());
        assert_eq!(q.coefficient_a(), 0.0);
        assert_eq!(q.first_derivative_at_position(0), 0.0);
    }
}
