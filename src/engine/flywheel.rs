//! Flywheel kinematics from raw impulse durations.
//!
//! Every impulse means the flywheel turned a fixed angle. From the timing of
//! those impulses this module derives angular position, velocity,
//! acceleration and the torque applied to the flywheel.
//!
//! ## Lag
//!
//! All "before flank" values describe the flywheel as of the oldest impulse
//! still inside the detection window (`flank_length` impulses). A phase
//! change is only confirmed once the whole window agrees, so values are
//! reported with the same delay and always belong to the phase they are
//! attributed to.
//!
//! ## Estimators
//!
//! - Raw impulse duration vs. raw time (OLS): its slope tells accelerating
//!   (negative) from decelerating (positive) and drives the phase predicates
//! - Angular distance vs. clean time (robust quadratic): its derivatives are
//!   angular velocity and acceleration. Each buffered position collects one
//!   estimate per fit it takes part in, averaged by the fits' R²
//! - Impulse duration vs. time during recovery (OLS): for a coasting flywheel
//!   this is a straight line whose slope is proportional to the drag factor

use std::collections::VecDeque;

use tracing::debug;

use crate::config::RowerSettings;
use crate::series::{OlsLinearSeries, StreamFilter, TsQuadraticSeries, WeightedSeries};

#[derive(Debug, Clone)]
pub struct Flywheel {
    settings: RowerSettings,
    angular_displacement_per_impulse: f64,
    minimum_torque_before_stroke: f64,
    /// Recovery samples needed before a drag estimate is trusted
    minimum_drag_factor_samples: usize,

    current_dt: StreamFilter,
    delta_time: OlsLinearSeries,
    angular_distance: TsQuadraticSeries,
    drag: StreamFilter,
    recovery_delta_time: OlsLinearSeries,
    minimum_recovery_slope: WeightedSeries,
    angular_velocity_matrix: VecDeque<WeightedSeries>,
    angular_acceleration_matrix: VecDeque<WeightedSeries>,

    maintain_metrics: bool,
    in_recovery_phase: bool,
    total_number_of_impulses: u64,
    total_time_spinning: f64,
    current_raw_time: f64,
    current_clean_time: f64,
    current_angular_distance: f64,

    delta_time_before_flank: f64,
    angular_velocity_before_flank: f64,
    angular_acceleration_before_flank: f64,
    torque_before_flank: f64,
    angular_velocity_at_begin_flank: f64,
    angular_acceleration_at_begin_flank: f64,
    torque_at_begin_flank: f64,
}

impl Flywheel {
    pub fn new(settings: &RowerSettings) -> Self {
        let flank = settings.flank_length;
        let minimum_drag_factor_samples =
            (settings.minimum_recovery_time / settings.maximum_time_between_impulses).floor() as usize;

        let mut flywheel = Self {
            angular_displacement_per_impulse: settings.angular_displacement_per_impulse(),
            minimum_torque_before_stroke: settings.minimum_torque_before_stroke(),
            minimum_drag_factor_samples,
            current_dt: StreamFilter::new(settings.smoothing, settings.maximum_time_between_impulses),
            delta_time: OlsLinearSeries::new(flank),
            angular_distance: TsQuadraticSeries::new(flank),
            drag: StreamFilter::new(settings.drag_factor_smoothing, settings.drag_factor_si()),
            recovery_delta_time: OlsLinearSeries::new(0),
            minimum_recovery_slope: WeightedSeries::new(
                settings.drag_factor_smoothing,
                settings.minimum_recovery_slope,
            ),
            angular_velocity_matrix: VecDeque::with_capacity(flank),
            angular_acceleration_matrix: VecDeque::with_capacity(flank),
            maintain_metrics: false,
            in_recovery_phase: false,
            total_number_of_impulses: 0,
            total_time_spinning: 0.0,
            current_raw_time: 0.0,
            current_clean_time: 0.0,
            current_angular_distance: 0.0,
            delta_time_before_flank: 0.0,
            angular_velocity_before_flank: 0.0,
            angular_acceleration_before_flank: 0.0,
            torque_before_flank: 0.0,
            angular_velocity_at_begin_flank: 0.0,
            angular_acceleration_at_begin_flank: 0.0,
            torque_at_begin_flank: 0.0,
            settings: settings.clone(),
        };
        flywheel.reset();
        flywheel
    }

    fn flank_length(&self) -> usize {
        self.settings.flank_length
    }

    fn window_filled(&self) -> bool {
        self.delta_time.len() >= self.flank_length()
    }

    /// Ingest the time since the previous impulse (s).
    pub fn push_value(&mut self, dt: f64) {
        let mut dt = dt;
        if !dt.is_finite()
            || dt < self.settings.minimum_time_between_impulses
            || dt > self.settings.maximum_stroke_time_before_pause
        {
            debug!(
                dt,
                replacement = self.current_dt.clean(),
                "Impulse outside plausible range, using last clean value"
            );
            dt = self.current_dt.clean();
        } else if dt > self.settings.maximum_time_between_impulses && self.maintain_metrics {
            debug!(dt, "Impulse longer than maximum time between impulses");
        }
        self.current_dt.push(dt);

        if self.maintain_metrics && self.window_filled() {
            // The oldest value in the window is certain to belong to one phase,
            // so it is consumed before the window shifts
            self.total_number_of_impulses += 1;
            self.delta_time_before_flank = self.delta_time.y_at_series_begin();
            self.total_time_spinning += self.delta_time_before_flank;
            self.angular_velocity_before_flank = self.angular_velocity_at_begin_flank;
            self.angular_acceleration_before_flank = self.angular_acceleration_at_begin_flank;
            self.torque_before_flank = self.torque_at_begin_flank;

            if self.in_recovery_phase {
                self.recovery_delta_time
                    .push(self.total_time_spinning, self.delta_time_before_flank);
            }
        } else {
            self.delta_time_before_flank = 0.0;
            self.angular_velocity_before_flank = 0.0;
            self.angular_acceleration_before_flank = 0.0;
            self.torque_before_flank = 0.0;
        }

        // Stroke detection works on raw durations: smoothing them would hide
        // the noise the goodness of fit is meant to catch
        self.current_raw_time += self.current_dt.raw();
        self.current_angular_distance += self.angular_displacement_per_impulse;
        self.delta_time.push(self.current_raw_time, self.current_dt.raw());

        self.current_clean_time += self.current_dt.clean();
        self.angular_distance
            .push(self.current_clean_time, self.current_angular_distance);

        self.update_derivative_matrices();

        self.torque_at_begin_flank = self.settings.flywheel_inertia * self.angular_acceleration_at_begin_flank
            + self.drag.clean() * self.angular_velocity_at_begin_flank.powi(2);
    }

    fn update_derivative_matrices(&mut self) {
        let flank = self.flank_length();
        if self.angular_velocity_matrix.len() >= flank {
            self.angular_velocity_matrix.pop_front();
            self.angular_acceleration_matrix.pop_front();
        }
        self.angular_velocity_matrix
            .push_back(WeightedSeries::new(flank, 0.0));
        self.angular_acceleration_matrix
            .push_back(WeightedSeries::new(flank, 0.0));

        let goodness_of_fit = self.angular_distance.goodness_of_fit();
        for (position, (velocity, acceleration)) in self
            .angular_velocity_matrix
            .iter_mut()
            .zip(self.angular_acceleration_matrix.iter_mut())
            .enumerate()
        {
            velocity.push(
                self.angular_distance.first_derivative_at_position(position),
                goodness_of_fit,
            );
            acceleration.push(
                self.angular_distance.second_derivative_at_position(position),
                goodness_of_fit,
            );
        }

        self.angular_velocity_at_begin_flank = self
            .angular_velocity_matrix
            .front()
            .map_or(0.0, WeightedSeries::weighted_average);
        self.angular_acceleration_at_begin_flank = self
            .angular_acceleration_matrix
            .front()
            .map_or(0.0, WeightedSeries::weighted_average);
    }

    /// Keep tracking timing, but freeze position, velocity and torque.
    pub fn maintain_state_only(&mut self) {
        self.maintain_metrics = false;
    }

    pub fn maintain_state_and_metrics(&mut self) {
        self.maintain_metrics = true;
    }

    pub fn mark_recovery_phase_start(&mut self) {
        self.in_recovery_phase = true;
        self.recovery_delta_time.reset();
    }

    /// Close the recovery and, if allowed and credible, update the drag factor
    /// (and the recovery slope threshold) from it.
    pub fn mark_recovery_phase_completed(&mut self) {
        self.in_recovery_phase = false;

        if !self.settings.auto_adjust_drag_factor {
            return;
        }

        let samples = self.recovery_delta_time.len();
        let slope = self.recovery_delta_time.slope();
        let goodness_of_fit = self.recovery_delta_time.goodness_of_fit();
        if samples > self.minimum_drag_factor_samples
            && slope > 0.0
            && (!self.drag.reliable() || goodness_of_fit >= self.settings.minimum_drag_quality)
        {
            let drag_factor = slope * self.settings.flywheel_inertia / self.angular_displacement_per_impulse;
            self.drag.push(drag_factor);
            debug!(
                drag_factor = drag_factor * 1e6,
                samples,
                goodness_of_fit,
                "Calculated drag factor"
            );

            if self.settings.auto_adjust_recovery_slope {
                let threshold = (1.0 - self.settings.auto_adjust_recovery_slope_margin) * slope;
                self.minimum_recovery_slope.push(threshold, goodness_of_fit);
                debug!(
                    threshold = self.minimum_recovery_slope.weighted_average(),
                    "Adjusted recovery slope threshold"
                );
            }
        } else {
            debug!(
                samples,
                required = self.minimum_drag_factor_samples,
                slope,
                goodness_of_fit,
                "Recovery not suitable for drag calculation"
            );
        }
    }

    // ========================================================================
    // Predicates
    // ========================================================================

    fn recovery_slope_threshold(&self) -> f64 {
        self.minimum_recovery_slope.weighted_average()
    }

    /// Flywheel is spinning down so slowly the rower has stopped rowing.
    pub fn is_dwelling(&self) -> bool {
        self.window_filled()
            && self.delta_time.slope() > 0.0
            && self
                .delta_time
                .number_of_y_values_above(self.settings.maximum_time_between_impulses)
                >= self.flank_length()
    }

    pub fn is_above_minimum_speed(&self) -> bool {
        self.delta_time
            .number_of_y_values_equal_or_below(self.settings.maximum_time_between_impulses)
            >= self.flank_length()
    }

    pub fn is_unpowered(&self) -> bool {
        let slope_indicates_coasting = self.delta_time.slope() >= self.recovery_slope_threshold()
            && self.delta_time.goodness_of_fit() >= self.settings.minimum_stroke_quality;
        let torque_absent = self.torque_at_begin_flank < self.minimum_torque_before_stroke;
        self.window_filled() && (slope_indicates_coasting || torque_absent)
    }

    pub fn is_powered(&self) -> bool {
        let slope_indicates_drive = self.delta_time.slope() < self.recovery_slope_threshold();
        let torque_present = self.torque_at_begin_flank > self.minimum_torque_before_stroke;
        !self.window_filled() || (slope_indicates_drive && torque_present)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    fn metrics_available(&self) -> bool {
        self.maintain_metrics && self.window_filled()
    }

    /// Duration of the impulse at the beginning of the flank (s).
    pub fn delta_time(&self) -> f64 {
        self.delta_time_before_flank
    }

    /// Total rotation since reset (rad).
    pub fn angular_position(&self) -> f64 {
        self.total_number_of_impulses as f64 * self.angular_displacement_per_impulse
    }

    /// Time the flywheel has been observed spinning with metrics on (s).
    pub fn spinning_time(&self) -> f64 {
        self.total_time_spinning
    }

    /// rad/s, never negative.
    pub fn angular_velocity(&self) -> f64 {
        if self.metrics_available() {
            self.angular_velocity_before_flank.max(0.0)
        } else {
            0.0
        }
    }

    /// rad/s²
    pub fn angular_acceleration(&self) -> f64 {
        if self.metrics_available() {
            self.angular_acceleration_before_flank
        } else {
            0.0
        }
    }

    /// N·m
    pub fn torque(&self) -> f64 {
        if self.metrics_available() {
            self.torque_before_flank
        } else {
            0.0
        }
    }

    /// Drag factor in SI units (N·m·s²), always positive.
    pub fn drag_factor(&self) -> f64 {
        self.drag.clean()
    }

    /// At least one drag factor was measured rather than configured.
    pub fn drag_factor_is_reliable(&self) -> bool {
        self.drag.reliable()
    }

    pub fn recovery_slope_threshold_value(&self) -> f64 {
        self.recovery_slope_threshold()
    }

    pub fn reset(&mut self) {
        let flank = self.flank_length();
        self.maintain_metrics = false;
        self.in_recovery_phase = false;
        self.current_dt.reset();
        self.delta_time.reset();
        self.angular_distance.reset();
        self.drag.reset();
        self.recovery_delta_time.reset();
        self.minimum_recovery_slope.reset();
        self.angular_velocity_matrix.clear();
        self.angular_acceleration_matrix.clear();
        self.total_number_of_impulses = 0;
        self.total_time_spinning = 0.0;
        self.current_raw_time = 0.0;
        self.current_clean_time = 0.0;
        self.current_angular_distance = 0.0;
        self.delta_time.push(0.0, 0.0);
        self.angular_distance.push(0.0, 0.0);
        self.angular_velocity_matrix.push_back(WeightedSeries::new(flank, 0.0));
        self.angular_acceleration_matrix.push_back(WeightedSeries::new(flank, 0.0));
        self.delta_time_before_flank = 0.0;
        self.angular_velocity_before_flank = 0.0;
        self.angular_acceleration_before_flank = 0.0;
        self.torque_before_flank = 0.0;
        self.angular_velocity_at_begin_flank = 0.0;
        self.angular_acceleration_at_begin_flank = 0.0;
        self.torque_at_begin_flank = 0.0;
    }
}
