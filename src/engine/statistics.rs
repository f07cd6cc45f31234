//! Session-level statistics and the session state machine.
//!
//! `RowingStatistics` owns the [`Rower`] and turns its stroke phases into a
//! rowing session: start, pause, resume and stop; workout intervals; smoothed
//! display metrics; calories and post-exercise heart-rate recovery.
//!
//! ## Session States
//!
//! ```text
//! WaitingForStart ──drive──▶ Rowing ◀──drive──▶ Paused
//!                              │
//!                              └──stop / last interval──▶ Stopped (until reset)
//! ```
//!
//! Transitions are driven by the *change* of the rower's stroke state between
//! two impulses, see [`session_transition`].
//!
//! ## Pausing
//!
//! When the flywheel dwells, the rower falls back to waiting and the session
//! pauses; the next drive resumes it. A commanded [`RowingStatistics::pause`]
//! also holds the rower stopped, so rowing only resumes after
//! [`RowingStatistics::resume`].

use tracing::{debug, error, info};

use super::Rower;
use crate::config::defaults::RECOVERY_HEART_RATE_SAMPLES;
use crate::config::{RowingConfig, UserSettings};
use crate::series::{OlsLinearSeries, StreamFilter};
use crate::types::{
    EngineEvent, HeartRateMeasurement, IntervalSetting, MetricsSnapshot, MetricsTrigger, SessionStatus,
    StrokeState,
};

/// Heart rates at or below this are treated as no reading.
const MINIMUM_CREDIBLE_HEART_RATE: u16 = 30;

// ============================================================================
// Transition function
// ============================================================================

/// Rule picked for one impulse by the session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionTransition {
    /// WaitingForStart → Rowing
    StartRowing,
    /// Paused → Rowing
    ResumeRowing,
    /// → Stopped
    StopRowing,
    /// Rowing → Paused
    PauseRowing,
    /// Drive → Recovery with the interval target reached
    DriveFinishedAtTarget,
    DriveFinished,
    /// Recovery → Drive with the interval target reached
    RecoveryFinishedAtTarget,
    RecoveryFinished,
    /// Target reached mid-phase
    IntervalTargetReached,
    ContinueRowing,
    /// Waiting, paused or stopped: nothing to update
    Idle,
}

/// Pick the session rule for one impulse.
///
/// `previous` and `current` are the rower's stroke state before and after the
/// impulse.
pub fn session_transition(
    status: SessionStatus,
    previous: StrokeState,
    current: StrokeState,
    interval_target_reached: bool,
) -> SessionTransition {
    use SessionStatus as S;
    use StrokeState as P;

    match (status, previous, current) {
        (S::WaitingForStart, _, P::Drive) => SessionTransition::StartRowing,
        (S::Paused, _, P::Drive) => SessionTransition::ResumeRowing,
        (S::WaitingForStart | S::Rowing, _, P::Stopped) => SessionTransition::StopRowing,
        (S::Rowing, _, P::WaitingForDrive) => SessionTransition::PauseRowing,
        (S::Rowing, P::Drive, P::Recovery) if interval_target_reached => SessionTransition::DriveFinishedAtTarget,
        (S::Rowing, P::Drive, P::Recovery) => SessionTransition::DriveFinished,
        (S::Rowing, P::Recovery, P::Drive) if interval_target_reached => {
            SessionTransition::RecoveryFinishedAtTarget
        }
        (S::Rowing, P::Recovery, P::Drive) => SessionTransition::RecoveryFinished,
        (S::Rowing, _, _) if interval_target_reached => SessionTransition::IntervalTargetReached,
        (S::Rowing, _, _) => SessionTransition::ContinueRowing,
        _ => SessionTransition::Idle,
    }
}

// ============================================================================
// Interval bookkeeping
// ============================================================================

/// Absolute finish line of the active interval plus the baseline it started from.
#[derive(Debug, Clone, Default)]
struct IntervalState {
    settings: Vec<IntervalSetting>,
    /// Index of the active interval, `None` before the first activation
    current: Option<usize>,
    target_distance: Option<f64>,
    target_time: Option<f64>,
    previous_accumulated_distance: f64,
    previous_accumulated_time: f64,
}

impl IntervalState {
    fn target_reached(&self, distance: f64, time: f64) -> bool {
        self.target_distance.is_some_and(|target| distance >= target)
            || self.target_time.is_some_and(|target| time >= target)
    }

    /// Move to the next interval, measured from the given totals.
    /// Returns false when the workout has no intervals left.
    fn activate_next(&mut self, distance: f64, time: f64) -> bool {
        let next = self.current.map_or(0, |i| i + 1);
        let Some(setting) = self.settings.get(next).copied() else {
            return false;
        };

        self.current = Some(next);
        self.previous_accumulated_distance = distance;
        self.previous_accumulated_time = time;
        self.target_distance = None;
        self.target_time = None;

        match (setting.target_distance, setting.target_time) {
            (Some(meters), _) if meters > 0.0 => {
                self.target_distance = Some(distance + meters);
                info!(interval = next + 1, of = self.settings.len(), meters, "Interval started: distance target");
            }
            (_, Some(seconds)) if seconds > 0.0 => {
                self.target_time = Some(time + seconds);
                info!(interval = next + 1, of = self.settings.len(), seconds, "Interval started: time target");
            }
            _ => {
                error!(time, "Interval without target, rowing without a finish line");
            }
        }
        true
    }
}

// ============================================================================
// RowingStatistics
// ============================================================================

#[derive(Debug, Clone)]
pub struct RowingStatistics {
    config: RowingConfig,
    rower: Rower,
    session_status: SessionStatus,
    last_stroke_state: StrokeState,
    intervals: IntervalState,

    minimum_stroke_time: f64,
    maximum_stroke_time: f64,

    cycle_duration: StreamFilter,
    cycle_distance: StreamFilter,
    cycle_power: StreamFilter,
    cycle_linear_velocity: StreamFilter,
    drive_duration: StreamFilter,
    drive_length: StreamFilter,
    drive_distance: StreamFilter,
    recovery_duration: StreamFilter,
    drive_average_handle_force: StreamFilter,
    drive_peak_handle_force: StreamFilter,
    drive_average_handle_power: StreamFilter,
    drive_peak_handle_power: StreamFilter,

    /// Cumulative calories over moving time
    calories: OlsLinearSeries,
    stroke_calories: f64,
    stroke_work: f64,

    total_moving_time: f64,
    total_linear_distance: f64,
    total_number_of_strokes: u32,
    drive_last_start_time: f64,
    instant_power: f64,
    drag_factor: f64,

    heart_rate: Option<HeartRateMeasurement>,
    recovery_heart_rates: Vec<u16>,
    recovery_heart_rate_active: bool,
}

impl RowingStatistics {
    pub fn new(config: &RowingConfig) -> Self {
        let rower_settings = &config.rower;
        let phases = config.session.phases_for_averaging;
        let minimum_stroke_time = rower_settings.minimum_stroke_time();
        let maximum_stroke_time = rower_settings.maximum_stroke_time();

        let mut calories = OlsLinearSeries::new(0);
        calories.push(0.0, 0.0);

        Self {
            rower: Rower::new(rower_settings),
            session_status: SessionStatus::WaitingForStart,
            last_stroke_state: StrokeState::WaitingForDrive,
            intervals: IntervalState::default(),
            minimum_stroke_time,
            maximum_stroke_time,
            cycle_duration: StreamFilter::new(phases, minimum_stroke_time + maximum_stroke_time),
            cycle_distance: StreamFilter::new(phases, 2.0),
            cycle_power: StreamFilter::new(phases, 50.0),
            cycle_linear_velocity: StreamFilter::new(phases, 3.0),
            drive_duration: StreamFilter::new(phases, rower_settings.minimum_drive_time),
            drive_length: StreamFilter::new(phases, 1.1),
            drive_distance: StreamFilter::new(phases, 3.0),
            recovery_duration: StreamFilter::new(phases, rower_settings.minimum_recovery_time),
            drive_average_handle_force: StreamFilter::new(phases, 0.0),
            drive_peak_handle_force: StreamFilter::new(phases, 0.0),
            drive_average_handle_power: StreamFilter::new(phases, 0.0),
            drive_peak_handle_power: StreamFilter::new(phases, 0.0),
            calories,
            stroke_calories: 0.0,
            stroke_work: 0.0,
            total_moving_time: 0.0,
            total_linear_distance: 0.0,
            total_number_of_strokes: 0,
            drive_last_start_time: 0.0,
            instant_power: 0.0,
            drag_factor: rower_settings.drag_factor,
            heart_rate: None,
            recovery_heart_rates: Vec::new(),
            recovery_heart_rate_active: false,
            config: config.clone(),
        }
    }

    // ========================================================================
    // Impulse path
    // ========================================================================

    /// Process one impulse duration (seconds) and return what happened, in order.
    pub fn handle_rotation_impulse(&mut self, dt: f64) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        if let Some(stroke) = self.rower.handle_rotation_impulse(dt) {
            events.push(EngineEvent::StrokeFinished(stroke));
        }

        let current = self.rower.stroke_state();
        let target_reached = self.interval_target_reached();
        let transition = session_transition(self.session_status, self.last_stroke_state, current, target_reached);

        match transition {
            SessionTransition::StartRowing => {
                info!(time = self.rower.total_moving_time_since_start(), "Rowing started");
                self.session_status = SessionStatus::Rowing;
                self.rower.allow_movement();
                self.update_continuous_metrics();
                events.push(self.event(MetricsTrigger::RecoveryFinished));
            }
            SessionTransition::ResumeRowing => {
                info!(time = self.rower.total_moving_time_since_start(), "Rowing resumed");
                self.session_status = SessionStatus::Rowing;
                self.rower.allow_movement();
                self.update_continuous_metrics();
                events.push(self.event(MetricsTrigger::RecoveryFinished));
            }
            SessionTransition::StopRowing => self.stop_training(&mut events),
            SessionTransition::PauseRowing => self.pause_training(false, &mut events),
            SessionTransition::DriveFinishedAtTarget => {
                self.update_continuous_metrics();
                self.update_cycle_metrics();
                self.handle_drive_end();
                self.finish_interval(&mut events);
            }
            SessionTransition::DriveFinished => {
                self.update_continuous_metrics();
                self.update_cycle_metrics();
                self.handle_drive_end();
                events.push(self.event(MetricsTrigger::DriveFinished));
            }
            SessionTransition::RecoveryFinishedAtTarget => {
                self.update_continuous_metrics();
                self.update_cycle_metrics();
                self.handle_recovery_end();
                self.finish_interval(&mut events);
            }
            SessionTransition::RecoveryFinished => {
                self.update_continuous_metrics();
                self.update_cycle_metrics();
                self.handle_recovery_end();
                events.push(self.event(MetricsTrigger::RecoveryFinished));
            }
            SessionTransition::IntervalTargetReached => {
                self.update_continuous_metrics();
                self.finish_interval(&mut events);
            }
            SessionTransition::ContinueRowing => self.update_continuous_metrics(),
            SessionTransition::Idle => {}
        }

        self.last_stroke_state = self.rower.stroke_state();
        events
    }

    fn interval_target_reached(&self) -> bool {
        self.intervals.target_reached(
            self.rower.total_linear_distance_since_start(),
            self.rower.total_moving_time_since_start(),
        )
    }

    fn update_continuous_metrics(&mut self) {
        self.total_moving_time = self.rower.total_moving_time_since_start();
        self.total_linear_distance = self.rower.total_linear_distance_since_start();
        self.instant_power = self.rower.instant_handle_power();
    }

    fn update_cycle_metrics(&mut self) {
        match self.rower.cycle_duration() {
            Some(duration) if duration > self.minimum_stroke_time && duration < self.maximum_stroke_time => {
                self.cycle_duration.push(duration);
                self.cycle_distance.push(self.rower.cycle_linear_distance());
                self.cycle_linear_velocity.push(self.rower.cycle_linear_velocity());
                self.cycle_power.push(self.rower.cycle_power());
            }
            duration => {
                debug!(?duration, "Stroke duration not credible, cycle statistics skipped");
            }
        }
    }

    fn handle_drive_end(&mut self) {
        self.total_number_of_strokes = self.rower.total_number_of_strokes();
        if let Some(duration) = self.rower.drive_duration() {
            self.drive_duration.push(duration);
        }
        self.drive_length.push(self.rower.drive_length());
        self.drive_distance.push(self.rower.drive_linear_distance());
        self.drive_average_handle_force.push(self.rower.drive_average_handle_force());
        self.drive_peak_handle_force.push(self.rower.drive_peak_handle_force());
        self.drive_average_handle_power.push(self.rower.drive_average_handle_power());
        self.drive_peak_handle_power.push(self.rower.drive_peak_handle_power());
    }

    fn handle_recovery_end(&mut self) {
        self.drive_last_start_time = self.rower.drive_last_start_time();
        if let Some(duration) = self.rower.recovery_duration() {
            self.recovery_duration.push(duration);
        }
        self.drag_factor = self.rower.drag_factor();

        // http://eodg.atm.ox.ac.uk/user/dudhia/rowing/physics/ergometer.html#section11
        let power = self.cycle_power.clean();
        let duration = self.cycle_duration.clean();
        self.stroke_calories = (4.0 * power + 350.0) * duration / 4200.0;
        self.stroke_work = power * duration;
        let total_calories = self.calories.y_at_series_end() + self.stroke_calories;
        self.calories.push(self.total_moving_time, total_calories);
    }

    /// Report the reached target, then move on; stop when no interval is left.
    fn finish_interval(&mut self, events: &mut Vec<EngineEvent>) {
        events.push(self.event(MetricsTrigger::IntervalTargetReached));
        if !self.intervals.activate_next(self.total_linear_distance, self.total_moving_time) {
            info!("Last interval completed");
            self.stop_training(events);
        }
    }

    fn pause_training(&mut self, hold_rower: bool, events: &mut Vec<EngineEvent>) {
        self.update_continuous_metrics();
        info!(time = self.total_moving_time, distance = self.total_linear_distance, "Rowing paused");
        events.push(self.event(MetricsTrigger::RowingPaused));
        if hold_rower {
            self.rower.stop_moving();
        } else {
            self.rower.pause_moving();
        }
        self.cycle_duration.reset();
        self.cycle_distance.reset();
        self.cycle_power.reset();
        self.cycle_linear_velocity.reset();
        self.instant_power = 0.0;
        self.session_status = SessionStatus::Paused;
        self.last_stroke_state = self.rower.stroke_state();
    }

    fn stop_training(&mut self, events: &mut Vec<EngineEvent>) {
        if self.session_status == SessionStatus::Rowing {
            self.update_continuous_metrics();
        }
        info!(time = self.total_moving_time, distance = self.total_linear_distance, "Rowing stopped");
        self.rower.stop_moving();
        events.push(self.event(MetricsTrigger::RowingStopped));
        self.session_status = SessionStatus::Stopped;
        self.last_stroke_state = StrokeState::Stopped;
        self.instant_power = 0.0;
        self.recovery_heart_rates.clear();
        self.recovery_heart_rate_active = true;
        if let Some(event) = self.record_recovery_heart_rate() {
            events.push(event);
        }
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Pause a rowing session and hold the rower until [`Self::resume`].
    pub fn pause(&mut self) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        if self.session_status == SessionStatus::Rowing {
            self.pause_training(true, &mut events);
        } else {
            debug!(status = %self.session_status, "Pause ignored");
        }
        events
    }

    /// Allow a paused session to continue; the next drive resumes rowing.
    pub fn resume(&mut self) -> Vec<EngineEvent> {
        if self.session_status == SessionStatus::Paused {
            info!("Rowing may resume");
            self.rower.allow_movement();
            self.last_stroke_state = self.rower.stroke_state();
        } else {
            debug!(status = %self.session_status, "Resume ignored");
        }
        Vec::new()
    }

    pub fn stop(&mut self) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        if self.session_status == SessionStatus::Stopped {
            debug!("Stop ignored, session already stopped");
        } else {
            self.stop_training(&mut events);
        }
        events
    }

    /// Stop if needed, then start over with a fresh rower and empty statistics.
    pub fn reset(&mut self) -> Vec<EngineEvent> {
        let events = self.stop();
        let heart_rate = self.heart_rate;
        *self = Self::new(&self.config);
        self.heart_rate = heart_rate;
        info!("Session reset");
        events
    }

    /// Replace the workout. The first interval becomes active immediately,
    /// measured from the current totals.
    pub fn set_interval_parameters(&mut self, settings: Vec<IntervalSetting>) -> Vec<EngineEvent> {
        if settings.is_empty() {
            error!("Workout without intervals received, ignored");
            return Vec::new();
        }
        info!(intervals = settings.len(), "Workout received");
        self.intervals = IntervalState {
            settings,
            ..IntervalState::default()
        };

        let mut events = Vec::new();
        if !self.intervals.activate_next(self.total_linear_distance, self.total_moving_time) {
            self.stop_training(&mut events);
        }
        events
    }

    // ========================================================================
    // Heart rate
    // ========================================================================

    pub fn push_heart_rate(&mut self, measurement: HeartRateMeasurement) {
        self.heart_rate = Some(measurement);
    }

    /// The strap went quiet: forget the last reading.
    pub fn expire_heart_rate(&mut self) {
        if self.heart_rate.take().is_some() {
            debug!("Heart rate expired");
        }
    }

    /// Take one post-exercise heart-rate sample. The first sample is the last
    /// exercise value; from the second on, the collected series is reported.
    pub fn record_recovery_heart_rate(&mut self) -> Option<EngineEvent> {
        if self.session_status != SessionStatus::Stopped || !self.recovery_heart_rate_active {
            return None;
        }

        let user: &UserSettings = &self.config.user;
        let heart_rate = self
            .heart_rate
            .map(|m| m.heart_rate)
            .filter(|&hr| f64::from(hr) >= user.resting_hr && f64::from(hr) <= user.max_hr);

        let Some(heart_rate) = heart_rate else {
            debug!("Heart rate recovery measurement skipped");
            self.recovery_heart_rate_active = false;
            return None;
        };

        debug!(sample = self.recovery_heart_rates.len(), heart_rate, "Heart rate recovery sample");
        self.recovery_heart_rates.push(heart_rate);
        self.recovery_heart_rate_active = self.recovery_heart_rates.len() < RECOVERY_HEART_RATE_SAMPLES;

        (self.recovery_heart_rates.len() > 1).then(|| EngineEvent::HeartRateRecovery {
            samples: self.recovery_heart_rates.clone(),
        })
    }

    /// True while another recovery sample should be scheduled.
    pub fn recovery_heart_rate_pending(&self) -> bool {
        self.session_status == SessionStatus::Stopped && self.recovery_heart_rate_active
    }

    pub fn recovery_heart_rates(&self) -> &[u16] {
        &self.recovery_heart_rates
    }

    // ========================================================================
    // Snapshot
    // ========================================================================

    fn event(&self, trigger: MetricsTrigger) -> EngineEvent {
        EngineEvent::metrics(trigger, self.snapshot())
    }

    pub fn session_status(&self) -> SessionStatus {
        self.session_status
    }

    pub fn rower(&self) -> &Rower {
        &self.rower
    }

    fn calories_per_period(&self, begin: f64, end: f64) -> f64 {
        self.calories.project_x(end) - self.calories.project_x(begin)
    }

    /// Current metrics. Fields without meaning outside an active session are
    /// zeroed or `None`.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let rower_settings = &self.config.rower;
        let rowing = self.session_status == SessionStatus::Rowing;
        let moving = rowing && self.cycle_linear_velocity.raw() > 0.0;
        let credible_cycle = moving
            && self.cycle_duration.raw() > self.minimum_stroke_time
            && self.cycle_duration.raw() < self.maximum_stroke_time;

        let velocity = if moving && self.cycle_linear_velocity.clean() > 0.0 {
            self.cycle_linear_velocity.clean()
        } else {
            0.0
        };
        let total_moving_time = self.total_moving_time.max(0.0);
        let total_linear_distance = self.total_linear_distance.max(0.0);
        let has_strokes = self.total_number_of_strokes > 0;

        let intervals = &self.intervals;
        let cycle_projected_end_time = match (intervals.target_distance, intervals.target_time) {
            (Some(target), _) if velocity > 0.0 => {
                Some(total_moving_time + (target - total_linear_distance) / velocity)
            }
            (_, Some(target)) => Some(target),
            _ => None,
        };
        let cycle_projected_end_linear_distance = match (intervals.target_distance, intervals.target_time) {
            (Some(target), _) => Some(target),
            (_, Some(target)) => Some(total_linear_distance + (target - total_moving_time) * velocity),
            _ => None,
        };

        let positive_or_zero = |filter: &StreamFilter| if rowing && filter.clean() > 0.0 { filter.clean() } else { 0.0 };

        MetricsSnapshot {
            session_status: self.session_status,
            stroke_state: self.rower.stroke_state(),

            total_moving_time,
            total_number_of_strokes: self.total_number_of_strokes,
            total_linear_distance,
            total_calories: self.calories.y_at_series_end().max(0.0),
            total_calories_per_minute: if total_moving_time > 60.0 {
                self.calories_per_period(total_moving_time - 60.0, total_moving_time)
            } else {
                self.calories_per_period(0.0, 60.0)
            },
            total_calories_per_hour: if total_moving_time > 3600.0 {
                self.calories_per_period(total_moving_time - 3600.0, total_moving_time)
            } else {
                self.calories_per_period(0.0, 3600.0)
            },

            interval_number: intervals.current.unwrap_or(0),
            interval_moving_time: total_moving_time - intervals.previous_accumulated_time,
            interval_target_time: intervals
                .target_time
                .filter(|&t| t > intervals.previous_accumulated_time)
                .map(|t| t - intervals.previous_accumulated_time),
            interval_linear_distance: total_linear_distance - intervals.previous_accumulated_distance,
            interval_target_distance: intervals
                .target_distance
                .filter(|&d| d > intervals.previous_accumulated_distance)
                .map(|d| d - intervals.previous_accumulated_distance),

            stroke_calories: self.stroke_calories.max(0.0),
            stroke_work: self.stroke_work.max(0.0),
            cycle_duration: credible_cycle.then(|| self.cycle_duration.clean()),
            cycle_stroke_rate: if credible_cycle { 60.0 / self.cycle_duration.clean() } else { 0.0 },
            cycle_distance: if moving && self.cycle_distance.raw() > 0.0 { self.cycle_distance.clean() } else { 0.0 },
            cycle_linear_velocity: velocity,
            cycle_pace: (velocity > 0.0).then(|| 500.0 / velocity),
            cycle_power: if moving && self.cycle_power.clean() > 0.0 { self.cycle_power.clean() } else { 0.0 },
            cycle_projected_end_time,
            cycle_projected_end_linear_distance,

            drive_last_start_time: self.drive_last_start_time.max(0.0),
            drive_duration: (rowing && has_strokes && self.drive_duration.clean() >= rower_settings.minimum_drive_time)
                .then(|| self.drive_duration.clean()),
            drive_length: (rowing && self.drive_length.clean() > 0.0).then(|| self.drive_length.clean()),
            drive_distance: (rowing && self.drive_distance.clean() >= 0.0).then(|| self.drive_distance.clean()),
            drive_average_handle_force: positive_or_zero(&self.drive_average_handle_force),
            drive_peak_handle_force: positive_or_zero(&self.drive_peak_handle_force),
            drive_average_handle_power: positive_or_zero(&self.drive_average_handle_power),
            drive_peak_handle_power: positive_or_zero(&self.drive_peak_handle_power),
            drive_handle_force_curve: self.rower.drive_handle_force_curve().to_vec(),
            drive_handle_velocity_curve: self.rower.drive_handle_velocity_curve().to_vec(),
            drive_handle_power_curve: self.rower.drive_handle_power_curve().to_vec(),

            recovery_duration: (rowing
                && has_strokes
                && self.recovery_duration.clean() >= rower_settings.minimum_recovery_time)
                .then(|| self.recovery_duration.clean()),

            drag_factor: if self.drag_factor > 0.0 { self.drag_factor } else { rower_settings.drag_factor },
            instant_power: if self.instant_power > 0.0 && self.rower.stroke_state() == StrokeState::Drive {
                self.instant_power
            } else {
                0.0
            },
            heart_rate: self
                .heart_rate
                .map(|m| m.heart_rate)
                .filter(|&hr| hr > MINIMUM_CREDIBLE_HEART_RATE),
            heart_rate_battery_level: self.heart_rate.and_then(|m| m.battery_level).filter(|&b| b > 0),
        }
    }
}
