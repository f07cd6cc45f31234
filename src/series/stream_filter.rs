//! Median-based noise filter.

use tracing::debug;

use super::BoundedSeries;

/// Keeps a window of raw values and exposes their median as the clean value.
///
/// Until the first value arrives, both `raw()` and `clean()` report the
/// default, so consumers always have something credible to work with.
#[derive(Debug, Clone)]
pub struct StreamFilter {
    window: BoundedSeries,
    default_value: f64,
    raw: f64,
    clean: f64,
}

impl StreamFilter {
    pub fn new(max_len: usize, default_value: f64) -> Self {
        Self {
            window: BoundedSeries::new(max_len.max(1)),
            default_value,
            raw: default_value,
            clean: default_value,
        }
    }

    /// Adds a value; NaN and infinities are discarded.
    pub fn push(&mut self, value: f64) {
        if !value.is_finite() {
            debug!(value, "StreamFilter ignoring non-finite value");
            return;
        }
        self.window.push(value);
        self.raw = value;
        self.clean = self.window.median();
    }

    /// Most recent accepted value.
    pub fn raw(&self) -> f64 {
        self.raw
    }

    /// Median of the window.
    pub fn clean(&self) -> f64 {
        self.clean
    }

    /// True once at least one real value has been accepted.
    pub fn reliable(&self) -> bool {
        !self.window.is_empty()
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn reset(&mut self) {
        self.window.reset();
        self.raw = self.default_value;
        self.clean = self.default_value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_until_first_push() {
        let filter = StreamFilter::new(3, 42.0);
        assert_eq!(filter.raw(), 42.0);
        assert_eq!(filter.clean(), 42.0);
        assert!(!filter.reliable());
    }

    #[test]
    fn test_clean_is_window_median() {
        let mut filter = StreamFilter::new(3, 0.0);
        filter.push(1.0);
        filter.push(100.0);
        filter.push(2.0);
        assert_eq!(filter.raw(), 2.0);
        assert_eq!(filter.clean(), 2.0, "single spike must not reach the clean value");
        assert!(filter.reliable());
    }

    #[test]
    fn test_nan_is_ignored() {
        let mut filter = StreamFilter::new(3, 5.0);
        filter.push(f64::NAN);
        assert!(!filter.reliable());
        assert_eq!(filter.clean(), 5.0);
        filter.push(3.0);
        filter.push(f64::INFINITY);
        assert_eq!(filter.raw(), 3.0);
    }

    #[test]
    fn test_reset_restores_default() {
        let mut filter = StreamFilter::new(3, 9.0);
        filter.push(1.0);
        filter.reset();
        assert_eq!(filter.clean(), 9.0);
        assert!(filter.is_empty());
    }
}
