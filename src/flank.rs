//! Moving Flank Detector
//!
//! Classifies a short run of impulse durations as accelerating (powered) or
//! decelerating (unpowered) by comparing neighbouring samples, tolerating a
//! bounded number of out-of-order samples.
//!
//! ## Noise Handling
//!
//! - Impulses outside `[minimum, maximum]` time between impulses are replaced
//!   by the previous clean value
//! - A moving average rejects jumps beyond the configured upward/downward
//!   change ratio, but gives up after a few consecutive corrections so a real
//!   change in speed is eventually followed
//!
//! The flywheel engine does not use this detector; it is kept as a
//! lightweight alternative for machines where regression-based detection is
//! too expensive.

use std::collections::VecDeque;

use tracing::{debug, error};

use crate::config::RowerSettings;

// ============================================================================
// Moving Averager
// ============================================================================

/// Fixed-size moving average, pre-filled with an initial value.
#[derive(Debug, Clone)]
pub struct MovingAverager {
    buffer: Vec<f64>,
    /// Index of the most recently written slot
    newest: usize,
    initial_value: f64,
}

impl MovingAverager {
    pub fn new(window_size: usize, initial_value: f64) -> Self {
        let window_size = window_size.max(1);
        Self {
            buffer: vec![initial_value; window_size],
            newest: window_size - 1,
            initial_value,
        }
    }

    pub fn push(&mut self, value: f64) {
        self.newest = (self.newest + 1) % self.buffer.len();
        self.buffer[self.newest] = value;
    }

    /// Overwrite the value added by the last `push`.
    pub fn replace_last_pushed_value(&mut self, value: f64) {
        self.buffer[self.newest] = value;
    }

    pub fn average(&self) -> f64 {
        self.buffer.iter().sum::<f64>() / self.buffer.len() as f64
    }

    pub fn reset(&mut self) {
        self.buffer.fill(self.initial_value);
        self.newest = self.buffer.len() - 1;
    }
}

// ============================================================================
// Detector Settings
// ============================================================================

/// Tuning of the moving flank detector.
#[derive(Debug, Clone)]
pub struct FlankDetectorSettings {
    pub flank_length: usize,
    pub smoothing: usize,
    pub minimum_time_between_impulses: f64,
    pub maximum_time_between_impulses: f64,
    pub angular_displacement_per_impulse: f64,
    /// Smallest accepted ratio between consecutive averaged impulses
    pub maximum_downward_change: f64,
    /// Largest accepted ratio between consecutive averaged impulses
    pub maximum_upward_change: f64,
    /// Out-of-order samples tolerated within one flank
    pub number_of_errors_allowed: usize,
    /// Angular acceleration of an unpowered flywheel (rad/s², negative).
    /// When set, phases are judged on acceleration instead of impulse order.
    pub natural_deceleration: Option<f64>,
}

impl FlankDetectorSettings {
    pub fn from_rower(rower: &RowerSettings) -> Self {
        Self {
            flank_length: rower.flank_length.max(1),
            smoothing: rower.smoothing.max(1),
            minimum_time_between_impulses: rower.minimum_time_between_impulses,
            maximum_time_between_impulses: rower.maximum_time_between_impulses,
            angular_displacement_per_impulse: rower.angular_displacement_per_impulse(),
            maximum_downward_change: 0.25,
            maximum_upward_change: 1.75,
            number_of_errors_allowed: 2,
            natural_deceleration: None,
        }
    }
}

// ============================================================================
// Detector
// ============================================================================

/// Sliding window of `flank_length + 1` impulses, index 0 being the newest.
#[derive(Debug, Clone)]
pub struct MovingFlankDetector {
    settings: FlankDetectorSettings,
    dirty: VecDeque<f64>,
    clean: VecDeque<f64>,
    angular_velocity: VecDeque<f64>,
    angular_acceleration: VecDeque<f64>,
    averager: MovingAverager,
    sequential_corrections: usize,
    max_sequential_corrections: usize,
}

impl MovingFlankDetector {
    pub fn new(settings: FlankDetectorSettings) -> Self {
        let max_sequential_corrections = settings.smoothing.max(2);
        let averager = MovingAverager::new(settings.smoothing, settings.maximum_time_between_impulses);
        let mut detector = Self {
            dirty: VecDeque::new(),
            clean: VecDeque::new(),
            angular_velocity: VecDeque::new(),
            angular_acceleration: VecDeque::new(),
            averager,
            sequential_corrections: 0,
            max_sequential_corrections,
            settings,
        };
        detector.reset();
        detector
    }

    pub fn reset(&mut self) {
        let len = self.settings.flank_length + 1;
        let max_dt = self.settings.maximum_time_between_impulses;
        let initial_velocity =
            self.settings.angular_displacement_per_impulse / self.settings.minimum_time_between_impulses;
        self.dirty = VecDeque::from(vec![max_dt; len]);
        self.clean = VecDeque::from(vec![max_dt; len]);
        self.angular_velocity = VecDeque::from(vec![initial_velocity; len]);
        self.angular_acceleration = VecDeque::from(vec![0.1; len]);
        self.averager.reset();
        self.sequential_corrections = 0;
    }

    fn shift_in<T: Copy>(window: &mut VecDeque<T>, value: T) {
        window.pop_back();
        window.push_front(value);
    }

    pub fn push_value(&mut self, dt: f64) {
        let previous_clean = self.clean[0];
        Self::shift_in(&mut self.dirty, dt);

        let mut value = dt;
        if !(self.settings.minimum_time_between_impulses..=self.settings.maximum_time_between_impulses)
            .contains(&dt)
        {
            debug!(dt, replacement = previous_clean, "Flank detector: impulse outside plausible range");
            value = previous_clean;
        }

        self.averager.push(value);
        let average = self.averager.average();
        if average < self.settings.maximum_downward_change * previous_clean
            || average > self.settings.maximum_upward_change * previous_clean
        {
            if self.sequential_corrections <= self.max_sequential_corrections {
                debug!(value, average, replacement = previous_clean, "Flank detector: change too steep, using previous value");
                self.averager.replace_last_pushed_value(previous_clean);
            } else {
                debug!(
                    value,
                    corrections = self.sequential_corrections,
                    "Flank detector: too many sequential corrections, accepting value"
                );
            }
            self.sequential_corrections += 1;
        } else {
            self.sequential_corrections = 0;
        }

        let clean = self.averager.average();
        let previous_velocity = self.angular_velocity[0];
        Self::shift_in(&mut self.clean, clean);
        if clean > 0.0 {
            let velocity = self.settings.angular_displacement_per_impulse / clean;
            Self::shift_in(&mut self.angular_velocity, velocity);
            Self::shift_in(&mut self.angular_acceleration, (velocity - previous_velocity) / clean);
        } else {
            error!("Flank detector: impulse of 0 seconds, derived values zeroed");
            Self::shift_in(&mut self.angular_velocity, 0.0);
            Self::shift_in(&mut self.angular_acceleration, 0.0);
        }
    }

    /// Flywheel coasted for the whole flank, up to the allowed error count.
    pub fn is_flywheel_unpowered(&self) -> bool {
        let flank = self.settings.flank_length;
        let errors = match self.settings.natural_deceleration {
            Some(natural) => (0..flank)
                .filter(|i| self.angular_acceleration[*i] > natural)
                .count(),
            // Older impulse at least as long as its successor means acceleration
            None => (1..=flank)
                .filter(|i| self.clean[*i] >= self.clean[*i - 1])
                .count(),
        };
        errors <= self.settings.number_of_errors_allowed
    }

    /// Flywheel was driven for the whole flank, up to the allowed error count.
    pub fn is_flywheel_powered(&self) -> bool {
        let flank = self.settings.flank_length;
        let errors = match self.settings.natural_deceleration {
            Some(natural) => (0..flank)
                .filter(|i| self.angular_acceleration[*i] < natural)
                .count(),
            None => (1..=flank)
                .filter(|i| self.clean[*i] < self.clean[*i - 1])
                .count(),
        };
        errors <= self.settings.number_of_errors_allowed
    }

    /// Raw time covered by the window, i.e. since the flank began.
    pub fn time_to_begin_of_flank(&self) -> f64 {
        self.dirty.iter().sum()
    }

    pub fn impulses_to_begin_of_flank(&self) -> usize {
        self.settings.flank_length
    }

    pub fn impulse_length_at_begin_of_flank(&self) -> f64 {
        self.clean[self.settings.flank_length]
    }

    pub fn angular_velocity_at_begin_of_flank(&self) -> f64 {
        self.angular_velocity[self.settings.flank_length]
    }

    pub fn acceleration_at_begin_of_flank(&self) -> f64 {
        self.angular_acceleration[self.settings.flank_length - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> FlankDetectorSettings {
        FlankDetectorSettings {
            flank_length: 4,
            smoothing: 1,
            minimum_time_between_impulses: 0.005,
            maximum_time_between_impulses: 0.05,
            angular_displacement_per_impulse: std::f64::consts::PI / 3.0,
            maximum_downward_change: 0.25,
            maximum_upward_change: 1.75,
            number_of_errors_allowed: 1,
            natural_deceleration: None,
        }
    }

    fn warmed_up(dt: f64) -> MovingFlankDetector {
        let mut detector = MovingFlankDetector::new(settings());
        for _ in 0..10 {
            detector.push_value(dt);
        }
        detector
    }

    #[test]
    fn test_moving_averager() {
        let mut averager = MovingAverager::new(3, 0.0);
        averager.push(3.0);
        assert!((averager.average() - 1.0).abs() < 1e-12);
        averager.push(6.0);
        averager.push(9.0);
        assert!((averager.average() - 6.0).abs() < 1e-12);
        averager.replace_last_pushed_value(0.0);
        assert!((averager.average() - 3.0).abs() < 1e-12);
        averager.push(12.0);
        assert!((averager.average() - 6.0).abs() < 1e-12, "oldest value (3) evicted");
        averager.reset();
        assert_eq!(averager.average(), 0.0);
    }

    #[test]
    fn test_accelerating_flywheel_is_powered() {
        let mut detector = warmed_up(0.02);
        for i in 0..5 {
            detector.push_value(0.02 - f64::from(i + 1) * 0.001);
        }
        assert!(detector.is_flywheel_powered());
        assert!(!detector.is_flywheel_unpowered());
        assert!(detector.acceleration_at_begin_of_flank() > 0.0);
    }

    #[test]
    fn test_decelerating_flywheel_is_unpowered() {
        let mut detector = warmed_up(0.015);
        for i in 0..5 {
            detector.push_value(0.015 + f64::from(i + 1) * 0.001);
        }
        assert!(detector.is_flywheel_unpowered());
        assert!(!detector.is_flywheel_powered());
    }

    #[test]
    fn test_single_out_of_order_sample_tolerated() {
        let mut detector = warmed_up(0.02);
        for dt in [0.019, 0.018, 0.0185, 0.017, 0.016] {
            detector.push_value(dt);
        }
        assert!(detector.is_flywheel_powered(), "one error is within the allowance");
    }

    #[test]
    fn test_out_of_range_impulse_replaced() {
        let mut detector = warmed_up(0.02);
        detector.push_value(0.5);
        assert!((detector.impulse_length_at_begin_of_flank() - 0.02).abs() < 1e-12);
        assert!((detector.clean[0] - 0.02).abs() < 1e-12, "too long impulse uses previous clean value");
    }

    #[test]
    fn test_steep_change_corrected_then_accepted() {
        let mut detector = warmed_up(0.04);
        // 0.008 / 0.04 = 0.2, below the 0.25 downward limit
        detector.push_value(0.008);
        assert!((detector.clean[0] - 0.04).abs() < 1e-12);
        detector.push_value(0.008);
        detector.push_value(0.008);
        detector.push_value(0.008);
        assert!((detector.clean[0] - 0.008).abs() < 1e-12, "filter gives way after repeated corrections");
    }

    #[test]
    fn test_natural_deceleration_mode() {
        let mut s = settings();
        s.natural_deceleration = Some(-1.0);
        let mut detector = MovingFlankDetector::new(s);
        for _ in 0..10 {
            detector.push_value(0.02);
        }
        for i in 0..5 {
            detector.push_value(0.02 + f64::from(i + 1) * 0.002);
        }
        assert!(detector.is_flywheel_unpowered());
    }

    #[test]
    fn test_time_to_begin_of_flank_sums_raw_impulses() {
        let detector = warmed_up(0.02);
        assert!((detector.time_to_begin_of_flank() - 0.1).abs() < 1e-12);
        assert_eq!(detector.impulses_to_begin_of_flank(), 4);
    }
}
