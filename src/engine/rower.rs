//! Rower: the drive/recovery stroke state machine.
//!
//! Owns the [`Flywheel`], decides the stroke phase from its predicates, and
//! converts flywheel rotation into boat-equivalent distance, speed and power.
//!
//! ## Linear Physics
//!
//! With drag factor `k` and boat constant `c`:
//!
//! - distance = (k/c)^(1/3) · Δθ
//! - velocity = (k/c)^(1/3) · Δθ/Δt
//! - power    = k · (Δθ/Δt)³
//!
//! Conversions that cannot be computed credibly keep the previous value and log.
//!
//! ## Transition Rules
//!
//! Evaluated once per impulse; the first rule that matches wins. See
//! [`stroke_transition`].

use tracing::{debug, error};

use super::Flywheel;
use crate::config::RowerSettings;
use crate::series::{CurveAligner, CurveMetrics};
use crate::types::{StrokeRecord, StrokeState};

// ============================================================================
// Transition function
// ============================================================================

/// Everything the stroke state machine looks at for one impulse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StrokeSignals {
    pub is_powered: bool,
    pub is_unpowered: bool,
    pub is_dwelling: bool,
    pub is_above_minimum_speed: bool,
    /// Time since drive start ≥ minimum drive time
    pub minimum_drive_time_elapsed: bool,
    /// Time since recovery start ≥ minimum recovery time
    pub minimum_recovery_time_elapsed: bool,
    /// Time since drive start ≥ maximum stroke time before pause
    pub pause_time_elapsed: bool,
}

/// The rule that fired for one impulse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrokeTransition {
    /// Stopped: nothing happens until movement is allowed again
    Stopped,
    /// Waiting → Drive: power applied above minimum speed
    StartDrive,
    /// Waiting, no clear force yet
    AwaitDrive,
    /// Drive → Recovery
    EndDrive,
    /// Drive looks unpowered but the minimum drive time has not passed
    DriveUnpoweredTooEarly,
    ContinueDrive,
    /// Recovery → Waiting: flywheel dwelling long after the last drive
    Pause,
    /// Recovery → Drive
    EndRecovery,
    /// Recovery looks powered but the minimum recovery time has not passed
    RecoveryPoweredTooEarly,
    ContinueRecovery,
}

impl StrokeTransition {
    /// State after this rule has been applied.
    pub fn next_state(self) -> StrokeState {
        match self {
            Self::Stopped => StrokeState::Stopped,
            Self::AwaitDrive | Self::Pause => StrokeState::WaitingForDrive,
            Self::StartDrive | Self::DriveUnpoweredTooEarly | Self::ContinueDrive | Self::EndRecovery => {
                StrokeState::Drive
            }
            Self::EndDrive | Self::RecoveryPoweredTooEarly | Self::ContinueRecovery => StrokeState::Recovery,
        }
    }
}

/// Pick the transition for `state` given this impulse's signals.
pub fn stroke_transition(state: StrokeState, signals: &StrokeSignals) -> StrokeTransition {
    match state {
        StrokeState::Stopped => StrokeTransition::Stopped,
        StrokeState::WaitingForDrive => {
            if signals.is_powered && signals.is_above_minimum_speed {
                StrokeTransition::StartDrive
            } else {
                StrokeTransition::AwaitDrive
            }
        }
        StrokeState::Drive => {
            if signals.minimum_drive_time_elapsed && signals.is_unpowered {
                StrokeTransition::EndDrive
            } else if signals.is_unpowered {
                StrokeTransition::DriveUnpoweredTooEarly
            } else {
                StrokeTransition::ContinueDrive
            }
        }
        StrokeState::Recovery => {
            if signals.pause_time_elapsed && signals.is_dwelling {
                StrokeTransition::Pause
            } else if signals.minimum_recovery_time_elapsed && signals.is_powered {
                StrokeTransition::EndRecovery
            } else if signals.is_powered {
                StrokeTransition::RecoveryPoweredTooEarly
            } else {
                StrokeTransition::ContinueRecovery
            }
        }
    }
}

// ============================================================================
// Rower
// ============================================================================

#[derive(Debug, Clone)]
pub struct Rower {
    settings: RowerSettings,
    flywheel: Flywheel,
    sprocket_radius: f64,
    stroke_state: StrokeState,
    total_number_of_strokes: u32,

    drive_handle_force: CurveMetrics,
    drive_handle_velocity: CurveMetrics,
    drive_handle_power: CurveMetrics,
    drive_handle_force_curve: CurveAligner,
    drive_handle_velocity_curve: CurveAligner,
    drive_handle_power_curve: CurveAligner,

    drive_start_time: f64,
    drive_start_angular_position: f64,
    drive_angular_displacement: f64,
    drive_duration: Option<f64>,
    drive_linear_distance: f64,
    drive_length: f64,

    recovery_start_time: f64,
    recovery_start_angular_position: f64,
    recovery_angular_displacement: f64,
    recovery_duration: Option<f64>,
    recovery_linear_distance: f64,

    cycle_duration: Option<f64>,
    cycle_linear_velocity: f64,
    cycle_power: f64,

    total_linear_distance: f64,
    preliminary_total_linear_distance: f64,
}

impl Rower {
    pub fn new(settings: &RowerSettings) -> Self {
        Self {
            flywheel: Flywheel::new(settings),
            sprocket_radius: settings.sprocket_radius_m(),
            stroke_state: StrokeState::WaitingForDrive,
            total_number_of_strokes: 0,
            drive_handle_force: CurveMetrics::new(),
            drive_handle_velocity: CurveMetrics::new(),
            drive_handle_power: CurveMetrics::new(),
            drive_handle_force_curve: CurveAligner::new(settings.minimum_force_before_stroke),
            drive_handle_velocity_curve: CurveAligner::new(0.0),
            drive_handle_power_curve: CurveAligner::new(0.0),
            drive_start_time: 0.0,
            drive_start_angular_position: 0.0,
            drive_angular_displacement: 0.0,
            drive_duration: None,
            drive_linear_distance: 0.0,
            drive_length: 0.0,
            recovery_start_time: 0.0,
            recovery_start_angular_position: 0.0,
            recovery_angular_displacement: 0.0,
            recovery_duration: None,
            recovery_linear_distance: 0.0,
            cycle_duration: None,
            cycle_linear_velocity: 0.0,
            cycle_power: 0.0,
            total_linear_distance: 0.0,
            preliminary_total_linear_distance: 0.0,
            settings: settings.clone(),
        }
    }

    fn signals(&self) -> StrokeSignals {
        let now = self.flywheel.spinning_time();
        StrokeSignals {
            is_powered: self.flywheel.is_powered(),
            is_unpowered: self.flywheel.is_unpowered(),
            is_dwelling: self.flywheel.is_dwelling(),
            is_above_minimum_speed: self.flywheel.is_above_minimum_speed(),
            minimum_drive_time_elapsed: now - self.drive_start_time >= self.settings.minimum_drive_time,
            minimum_recovery_time_elapsed: now - self.recovery_start_time
                >= self.settings.minimum_recovery_time,
            pause_time_elapsed: now - self.drive_start_time
                >= self.settings.maximum_stroke_time_before_pause,
        }
    }

    /// Process one impulse. Returns the finished stroke when a recovery closes.
    pub fn handle_rotation_impulse(&mut self, dt: f64) -> Option<StrokeRecord> {
        self.flywheel.push_value(dt);

        let transition = stroke_transition(self.stroke_state, &self.signals());
        let now = self.flywheel.spinning_time();
        let mut finished = None;

        match transition {
            StrokeTransition::Stopped | StrokeTransition::AwaitDrive => {}
            StrokeTransition::StartDrive => {
                debug!(time = now, "Rowing (re)started with a drive phase");
                self.flywheel.maintain_state_and_metrics();
                self.start_drive_phase();
            }
            StrokeTransition::EndDrive => {
                debug!(time = now, "Recovery phase started");
                self.end_drive_phase();
                self.start_recovery_phase();
            }
            StrokeTransition::DriveUnpoweredTooEarly => {
                debug!(
                    time = now,
                    drive_time = now - self.drive_start_time,
                    minimum = self.settings.minimum_drive_time,
                    "Flywheel looks unpowered, waiting for minimum drive time"
                );
                self.update_drive_phase();
            }
            StrokeTransition::ContinueDrive => self.update_drive_phase(),
            StrokeTransition::Pause => {
                debug!(
                    time = now,
                    since_drive = now - self.drive_start_time,
                    "Paused: flywheel dwelling since last drive"
                );
                self.flywheel.maintain_state_only();
                finished = Some(self.end_recovery_phase(true));
            }
            StrokeTransition::EndRecovery => {
                debug!(time = now, "Drive phase started");
                finished = Some(self.end_recovery_phase(false));
                self.start_drive_phase();
            }
            StrokeTransition::RecoveryPoweredTooEarly => {
                debug!(
                    time = now,
                    recovery_time = now - self.recovery_start_time,
                    minimum = self.settings.minimum_recovery_time,
                    "Flywheel looks powered, waiting for minimum recovery time"
                );
                self.update_recovery_phase();
            }
            StrokeTransition::ContinueRecovery => self.update_recovery_phase(),
        }

        self.stroke_state = transition.next_state();
        finished
    }

    fn start_drive_phase(&mut self) {
        self.drive_start_time = self.flywheel.spinning_time();
        self.drive_start_angular_position = self.flywheel.angular_position();
        self.drive_handle_force.reset();
        self.drive_handle_velocity.reset();
        self.drive_handle_power.reset();
        self.push_handle_samples();
    }

    fn push_handle_samples(&mut self) {
        let dt = self.flywheel.delta_time();
        let torque = self.flywheel.torque();
        let angular_velocity = self.flywheel.angular_velocity();
        self.drive_handle_force.push(dt, torque / self.sprocket_radius);
        self.drive_handle_velocity.push(dt, angular_velocity * self.sprocket_radius);
        self.drive_handle_power.push(dt, torque * angular_velocity);
    }

    fn update_drive_phase(&mut self) {
        self.drive_angular_displacement = self.flywheel.angular_position() - self.drive_start_angular_position;
        self.drive_linear_distance = self.linear_distance(self.drive_angular_displacement, self.drive_linear_distance);
        self.preliminary_total_linear_distance = self.total_linear_distance + self.drive_linear_distance;
        self.push_handle_samples();
    }

    fn end_drive_phase(&mut self) {
        let now = self.flywheel.spinning_time();
        let drive_duration = now - self.drive_start_time;
        self.drive_duration = Some(drive_duration);
        self.drive_angular_displacement = self.flywheel.angular_position() - self.drive_start_angular_position;
        self.drive_length = self.drive_angular_displacement * self.sprocket_radius;
        self.drive_linear_distance = self.linear_distance(self.drive_angular_displacement, self.drive_linear_distance);
        self.total_linear_distance += self.drive_linear_distance;
        self.drive_handle_force_curve.push(self.drive_handle_force.curve());
        self.drive_handle_velocity_curve.push(self.drive_handle_velocity.curve());
        self.drive_handle_power_curve.push(self.drive_handle_power.curve());
        self.update_cycle_metrics();
        self.preliminary_total_linear_distance = self.total_linear_distance;
        self.total_number_of_strokes += 1;
    }

    fn start_recovery_phase(&mut self) {
        self.recovery_start_time = self.flywheel.spinning_time();
        self.recovery_start_angular_position = self.flywheel.angular_position();
        self.flywheel.mark_recovery_phase_start();
    }

    fn update_recovery_phase(&mut self) {
        self.recovery_angular_displacement =
            self.flywheel.angular_position() - self.recovery_start_angular_position;
        self.recovery_linear_distance =
            self.linear_distance(self.recovery_angular_displacement, self.recovery_linear_distance);
        self.preliminary_total_linear_distance = self.total_linear_distance + self.recovery_linear_distance;
    }

    fn end_recovery_phase(&mut self, ended_in_pause: bool) -> StrokeRecord {
        let now = self.flywheel.spinning_time();
        let recovery_duration = now - self.recovery_start_time;
        self.recovery_duration = Some(recovery_duration);
        self.recovery_angular_displacement =
            self.flywheel.angular_position() - self.recovery_start_angular_position;
        self.recovery_linear_distance =
            self.linear_distance(self.recovery_angular_displacement, self.recovery_linear_distance);
        self.total_linear_distance += self.recovery_linear_distance;
        self.update_cycle_metrics();
        self.flywheel.mark_recovery_phase_completed();
        self.preliminary_total_linear_distance = self.total_linear_distance;

        StrokeRecord {
            stroke_number: self.total_number_of_strokes,
            drive_duration: self.drive_duration.unwrap_or(0.0),
            drive_length: self.drive_length,
            drive_distance: self.drive_linear_distance,
            drive_average_handle_force: self.drive_handle_force.average(),
            drive_peak_handle_force: self.drive_handle_force.peak(),
            recovery_duration,
            recovery_distance: self.recovery_linear_distance,
            cycle_duration: self.cycle_duration.unwrap_or(0.0),
            cycle_distance: self.cycle_linear_distance(),
            cycle_linear_velocity: self.cycle_linear_velocity,
            cycle_power: self.cycle_power,
            drag_factor: self.drag_factor(),
            ended_in_pause,
        }
    }

    fn update_cycle_metrics(&mut self) {
        self.cycle_duration = match (self.drive_duration, self.recovery_duration) {
            (Some(drive), Some(recovery)) => Some(drive + recovery),
            _ => None,
        };
        let displacement = self.drive_angular_displacement + self.recovery_angular_displacement;
        self.cycle_linear_velocity = self.linear_velocity(displacement);
        self.cycle_power = self.calculate_cycle_power(displacement);
    }

    fn distance_factor(&self) -> f64 {
        (self.flywheel.drag_factor() / self.settings.magic_constant).cbrt()
    }

    fn linear_distance(&self, angular_displacement: f64, previous: f64) -> f64 {
        if angular_displacement >= 0.0 {
            self.distance_factor() * angular_displacement
        } else {
            error!(
                time = self.flywheel.spinning_time(),
                angular_displacement,
                "Linear distance: angular displacement not credible"
            );
            previous
        }
    }

    fn linear_velocity(&self, angular_displacement: f64) -> f64 {
        match self.cycle_duration {
            Some(duration) if angular_displacement > 0.0 && duration > 0.0 => {
                self.distance_factor() * angular_displacement / duration
            }
            _ => {
                debug!(angular_displacement, duration = ?self.cycle_duration, "Linear velocity not credible, keeping previous value");
                self.cycle_linear_velocity
            }
        }
    }

    fn calculate_cycle_power(&self, angular_displacement: f64) -> f64 {
        match (self.drive_duration, self.cycle_duration) {
            (Some(drive), Some(cycle))
                if drive >= self.settings.minimum_drive_time && cycle >= self.settings.minimum_stroke_time() =>
            {
                self.flywheel.drag_factor() * (angular_displacement / cycle).powi(3)
            }
            _ => {
                debug!(drive = ?self.drive_duration, cycle = ?self.cycle_duration, "Cycle power not credible, keeping previous value");
                self.cycle_power
            }
        }
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Leave the stopped state; the next powered impulse starts a drive.
    pub fn allow_movement(&mut self) {
        if self.stroke_state == StrokeState::Stopped {
            self.stroke_state = StrokeState::WaitingForDrive;
        }
    }

    pub fn pause_moving(&mut self) {
        self.stroke_state = StrokeState::WaitingForDrive;
    }

    /// Freeze the rower; the flywheel keeps tracking timing but no longer
    /// accumulates position or moving time.
    pub fn stop_moving(&mut self) {
        self.flywheel.maintain_state_only();
        self.stroke_state = StrokeState::Stopped;
    }

    pub fn reset(&mut self) {
        *self = Self::new(&self.settings);
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn stroke_state(&self) -> StrokeState {
        self.stroke_state
    }

    pub fn total_number_of_strokes(&self) -> u32 {
        self.total_number_of_strokes
    }

    pub fn total_moving_time_since_start(&self) -> f64 {
        self.flywheel.spinning_time().max(0.0)
    }

    pub fn drive_last_start_time(&self) -> f64 {
        self.drive_start_time
    }

    /// Includes the distance of the phase in progress.
    pub fn total_linear_distance_since_start(&self) -> f64 {
        self.preliminary_total_linear_distance.max(self.total_linear_distance)
    }

    pub fn cycle_duration(&self) -> Option<f64> {
        self.cycle_duration
    }

    pub fn cycle_linear_distance(&self) -> f64 {
        self.drive_linear_distance + self.recovery_linear_distance
    }

    pub fn cycle_linear_velocity(&self) -> f64 {
        self.cycle_linear_velocity
    }

    pub fn cycle_power(&self) -> f64 {
        self.cycle_power
    }

    pub fn drive_duration(&self) -> Option<f64> {
        self.drive_duration
    }

    pub fn drive_linear_distance(&self) -> f64 {
        self.drive_linear_distance
    }

    pub fn drive_length(&self) -> f64 {
        self.drive_length
    }

    pub fn drive_average_handle_force(&self) -> f64 {
        self.drive_handle_force.average()
    }

    pub fn drive_peak_handle_force(&self) -> f64 {
        self.drive_handle_force.peak()
    }

    pub fn drive_average_handle_power(&self) -> f64 {
        self.drive_handle_power.average()
    }

    pub fn drive_peak_handle_power(&self) -> f64 {
        self.drive_handle_power.peak()
    }

    /// Force curve of the last finished drive, trimmed below the minimum
    /// stroke force at both ends. Stays in place while the next drive runs.
    pub fn drive_handle_force_curve(&self) -> &[f64] {
        self.drive_handle_force_curve.last_complete_curve()
    }

    pub fn drive_handle_velocity_curve(&self) -> &[f64] {
        self.drive_handle_velocity_curve.last_complete_curve()
    }

    pub fn drive_handle_power_curve(&self) -> &[f64] {
        self.drive_handle_power_curve.last_complete_curve()
    }

    pub fn recovery_duration(&self) -> Option<f64> {
        self.recovery_duration
    }

    /// Drag factor in display units.
    pub fn drag_factor(&self) -> f64 {
        self.flywheel.drag_factor() * crate::config::defaults::DRAG_FACTOR_DISPLAY_SCALE
    }

    /// Handle power right now (W), 0 outside the drive.
    pub fn instant_handle_power(&self) -> f64 {
        if self.stroke_state == StrokeState::Drive {
            self.flywheel.torque() * self.flywheel.angular_velocity()
        } else {
            0.0
        }
    }

    pub fn flywheel(&self) -> &Flywheel {
        &self.flywheel
    }
}
