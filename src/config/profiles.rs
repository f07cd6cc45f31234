//! Presets for known rowing machines.

use super::RowerSettings;

/// A named set of [`RowerSettings`] tuned for one machine model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowerProfile {
    /// Conservative settings for an unknown air or magnetic rower.
    Default,
    /// Concept2 model D/E RowErg with a 6-magnet flywheel sensor.
    Concept2RowErg,
}

impl RowerProfile {
    pub const ALL: [Self; 2] = [Self::Default, Self::Concept2RowErg];

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "default" => Some(Self::Default),
            "concept2_rowerg" | "concept2" | "rowerg" => Some(Self::Concept2RowErg),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Concept2RowErg => "concept2_rowerg",
        }
    }

    pub fn settings(self) -> RowerSettings {
        match self {
            Self::Default => RowerSettings::default(),
            Self::Concept2RowErg => RowerSettings {
                profile: self.name().to_string(),
                num_of_impulses_per_revolution: 6,
                sprocket_radius_cm: 1.4,
                minimum_force_before_stroke: 50.0,
                minimum_time_between_impulses: 0.005,
                maximum_time_between_impulses: 0.020,
                smoothing: 1,
                flank_length: 12,
                minimum_stroke_quality: 0.36,
                minimum_recovery_slope: 0.00070,
                auto_adjust_recovery_slope: true,
                auto_adjust_recovery_slope_margin: 0.035,
                minimum_drive_time: 0.40,
                minimum_recovery_time: 0.90,
                flywheel_inertia: 0.10138,
                drag_factor: 110.0,
                auto_adjust_drag_factor: true,
                drag_factor_smoothing: 3,
                minimum_drag_quality: 0.95,
                magic_constant: 2.8,
                maximum_stroke_time_before_pause: 6.0,
            },
        }
    }
}

impl std::fmt::Display for RowerProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
