//! Records handed out by the engine: metrics snapshots, finished strokes and
//! the events that carry them.

use serde::{Deserialize, Serialize};

use super::{SessionStatus, StrokeState};

// ============================================================================
// Inbound
// ============================================================================

/// One reading from a heart-rate strap.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct HeartRateMeasurement {
    /// Beats per minute
    pub heart_rate: u16,
    /// Strap battery level (%), when the strap reports it
    #[serde(default)]
    pub battery_level: Option<u8>,
}

/// One workout interval: finishes on distance, on time, or runs open ended
/// when neither target is set.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct IntervalSetting {
    /// Meters
    #[serde(default)]
    pub target_distance: Option<f64>,
    /// Seconds of moving time
    #[serde(default)]
    pub target_time: Option<f64>,
}

impl IntervalSetting {
    pub fn distance(meters: f64) -> Self {
        Self {
            target_distance: Some(meters),
            target_time: None,
        }
    }

    pub fn time(seconds: f64) -> Self {
        Self {
            target_distance: None,
            target_time: Some(seconds),
        }
    }

    /// Targets of zero or below count as unset.
    pub fn has_target(&self) -> bool {
        self.target_distance.is_some_and(|d| d > 0.0) || self.target_time.is_some_and(|t| t > 0.0)
    }
}

// ============================================================================
// Outbound
// ============================================================================

/// Why a metrics snapshot was emitted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum MetricsTrigger {
    /// Periodic display tick
    WebUpdate,
    /// Periodic Bluetooth/ANT+ tick
    PeripheralUpdate,
    RecoveryFinished,
    DriveFinished,
    IntervalTargetReached,
    RowingPaused,
    RowingStopped,
}

/// Everything a display or peripheral needs, as of one moment.
///
/// Values that have no meaning in the current state are `None` (pace while
/// standing still) or zero (power while paused); they are never stale.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetricsSnapshot {
    pub session_status: SessionStatus,
    pub stroke_state: StrokeState,

    // Totals
    /// Seconds the flywheel has been driven since start
    pub total_moving_time: f64,
    pub total_number_of_strokes: u32,
    /// Meters
    pub total_linear_distance: f64,
    pub total_calories: f64,
    pub total_calories_per_minute: f64,
    pub total_calories_per_hour: f64,

    // Interval
    /// 0-based index of the active interval
    pub interval_number: usize,
    pub interval_moving_time: f64,
    pub interval_target_time: Option<f64>,
    pub interval_linear_distance: f64,
    pub interval_target_distance: Option<f64>,

    // Last stroke
    /// kcal
    pub stroke_calories: f64,
    /// Joules
    pub stroke_work: f64,
    pub cycle_duration: Option<f64>,
    /// Strokes per minute
    pub cycle_stroke_rate: f64,
    pub cycle_distance: f64,
    /// m/s
    pub cycle_linear_velocity: f64,
    /// Seconds per 500 m
    pub cycle_pace: Option<f64>,
    /// Watts
    pub cycle_power: f64,
    /// Moving time at which the active interval target will be reached at the current pace
    pub cycle_projected_end_time: Option<f64>,
    /// Total distance at which the active interval target will be reached at the current pace
    pub cycle_projected_end_linear_distance: Option<f64>,

    // Drive
    /// Moving time at which the last drive began
    pub drive_last_start_time: f64,
    pub drive_duration: Option<f64>,
    /// Handle travel (m)
    pub drive_length: Option<f64>,
    pub drive_distance: Option<f64>,
    /// Newtons
    pub drive_average_handle_force: f64,
    pub drive_peak_handle_force: f64,
    /// Watts
    pub drive_average_handle_power: f64,
    pub drive_peak_handle_power: f64,
    pub drive_handle_force_curve: Vec<f64>,
    pub drive_handle_velocity_curve: Vec<f64>,
    pub drive_handle_power_curve: Vec<f64>,

    // Recovery
    pub recovery_duration: Option<f64>,

    /// Display units (N·m·s² × 10⁶)
    pub drag_factor: f64,
    /// Handle power at this moment (W), only during the drive
    pub instant_power: f64,
    pub heart_rate: Option<u16>,
    pub heart_rate_battery_level: Option<u8>,
}

/// One completed stroke: a drive and the recovery that followed it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StrokeRecord {
    /// 1-based
    pub stroke_number: u32,
    pub drive_duration: f64,
    pub drive_length: f64,
    pub drive_distance: f64,
    pub drive_average_handle_force: f64,
    pub drive_peak_handle_force: f64,
    pub recovery_duration: f64,
    pub recovery_distance: f64,
    pub cycle_duration: f64,
    pub cycle_distance: f64,
    pub cycle_linear_velocity: f64,
    pub cycle_power: f64,
    /// Display units, as in effect when the recovery closed
    pub drag_factor: f64,
    /// Recovery closed by a pause instead of the next drive
    pub ended_in_pause: bool,
}

/// Output of the session engine, in the order it happened.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum EngineEvent {
    Metrics {
        trigger: MetricsTrigger,
        snapshot: Box<MetricsSnapshot>,
    },
    StrokeFinished(StrokeRecord),
    /// Heart rate after the session stopped: the last exercise value
    /// followed by one sample per recovery minute
    HeartRateRecovery { samples: Vec<u16> },
}

impl EngineEvent {
    pub fn metrics(trigger: MetricsTrigger, snapshot: MetricsSnapshot) -> Self {
        Self::Metrics {
            trigger,
            snapshot: Box::new(snapshot),
        }
    }

    pub fn trigger(&self) -> Option<MetricsTrigger> {
        match self {
            Self::Metrics { trigger, .. } => Some(*trigger),
            Self::StrokeFinished(_) | Self::HeartRateRecovery { .. } => None,
        }
    }

    pub fn snapshot(&self) -> Option<&MetricsSnapshot> {
        match self {
            Self::Metrics { snapshot, .. } => Some(snapshot),
            Self::StrokeFinished(_) | Self::HeartRateRecovery { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_target_detection() {
        assert!(IntervalSetting::distance(500.0).has_target());
        assert!(IntervalSetting::time(120.0).has_target());
        assert!(!IntervalSetting::default().has_target());
        assert!(!IntervalSetting::distance(0.0).has_target());
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let event = EngineEvent::metrics(MetricsTrigger::DriveFinished, MetricsSnapshot::default());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "metrics");
        assert_eq!(json["trigger"], "driveFinished");
        assert_eq!(json["snapshot"]["session_status"], "waitingForStart");
        assert!(json["snapshot"]["cycle_pace"].is_null());
    }

    #[test]
    fn test_heart_rate_battery_optional_in_json() {
        let hr: HeartRateMeasurement = serde_json::from_str(r#"{"heart_rate": 142}"#).unwrap();
        assert_eq!(hr.heart_rate, 142);
        assert_eq!(hr.battery_level, None);
    }
}
