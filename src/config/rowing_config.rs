//! Rowing Configuration Schema
//!
//! All settings are serde structs with per-field defaults, so a config file
//! only needs the keys it wants to change. An empty file is a valid config.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use super::defaults::{
    DRAG_FACTOR_DISPLAY_SCALE, MAX_PERIPHERAL_UPDATE_INTERVAL_MS, MAX_WEB_UPDATE_INTERVAL_MS,
};
use super::RowerProfile;

/// Environment variable naming the config file to load.
pub const CONFIG_ENV_VAR: &str = "ROWMETRICS_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "rowmetrics.toml";

// ============================================================================
// Root
// ============================================================================

/// Root configuration: the machine, the person rowing and the session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RowingConfig {
    #[serde(default)]
    pub rower: RowerSettings,

    #[serde(default)]
    pub user: UserSettings,

    #[serde(default)]
    pub session: SessionSettings,
}

impl RowingConfig {
    /// Load configuration using the standard search order.
    ///
    /// Never fails: an unreadable or invalid file is logged and the next
    /// source is tried, ending with built-in defaults.
    pub fn load() -> Self {
        // 1. Check env var
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), profile = %config.rower.profile, "Loaded rowing config from {}", CONFIG_ENV_VAR);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        // 2. Check ./rowmetrics.toml
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(profile = %config.rower.profile, "Loaded rowing config from ./{}", LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        // 3. Defaults
        info!("No {} found, using built-in defaults", LOCAL_CONFIG_FILE);
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::parse(&contents, path)
    }

    /// Parse a TOML document that did not come from a file.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Self::parse(contents, Path::new("<inline>"))
    }

    fn parse(contents: &str, source: &Path) -> Result<Self, ConfigError> {
        // Two-pass: check for unknown keys first (warnings only)
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let mut raw: toml::Value = contents
            .parse()
            .map_err(|e| ConfigError::Parse(source.to_path_buf(), e))?;
        apply_rower_profile(&mut raw)?;

        let config: Self = raw
            .try_into()
            .map_err(|e| ConfigError::Parse(source.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Write this config to disk as TOML.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        std::fs::write(path, contents).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "Rowing config saved");
        Ok(())
    }

    /// Reject physically impossible settings; log suspicious ones.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (errors, warnings) = super::validation::validate_physical_ranges(self);
        for w in &warnings {
            warn!(field = %w.field, "{}", w);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

/// Replace `[rower]` with the selected profile's settings overlaid by the
/// user's explicit keys.
fn apply_rower_profile(raw: &mut toml::Value) -> Result<(), ConfigError> {
    let Some(root) = raw.as_table_mut() else {
        return Ok(());
    };

    let user_rower = match root.remove("rower") {
        Some(toml::Value::Table(table)) => table,
        Some(other) => {
            // Let serde report the type error against the original value
            root.insert("rower".to_string(), other);
            return Ok(());
        }
        None => toml::map::Map::new(),
    };

    let profile_name = user_rower
        .get("profile")
        .and_then(toml::Value::as_str)
        .unwrap_or(RowerProfile::Default.name())
        .to_string();
    let profile = RowerProfile::from_name(&profile_name)
        .ok_or_else(|| ConfigError::UnknownProfile(profile_name.clone()))?;

    let mut merged = match toml::Value::try_from(profile.settings()).map_err(ConfigError::Serialize)? {
        toml::Value::Table(table) => table,
        _ => toml::map::Map::new(),
    };
    for (key, value) in user_rower {
        merged.insert(key, value);
    }
    merged.insert(
        "profile".to_string(),
        toml::Value::String(profile.name().to_string()),
    );
    root.insert("rower".to_string(), toml::Value::Table(merged));
    Ok(())
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {1}", .0.display())]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Config parse error ({}): {1}", .0.display())]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("Config serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Unknown rower profile '{0}'")]
    UnknownProfile(String),

    #[error("Config validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<String>),
}

fn format_validation_errors(errors: &[String]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// Rower (machine physics and stroke detection)
// ============================================================================

/// Everything that describes the rowing machine and how strokes are detected on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowerSettings {
    /// Name of the preset these settings started from
    #[serde(default = "default_profile")]
    pub profile: String,

    /// Sensor impulses per flywheel revolution
    #[serde(default = "default_impulses_per_revolution")]
    pub num_of_impulses_per_revolution: u32,

    /// Radius of the sprocket the handle chain/strap winds on (cm)
    #[serde(default = "default_sprocket_radius")]
    pub sprocket_radius_cm: f64,

    /// Handle force below which the drive is considered finished (N)
    #[serde(default)]
    pub minimum_force_before_stroke: f64,

    /// Shortest credible time between impulses (s)
    #[serde(default = "default_min_time_between_impulses")]
    pub minimum_time_between_impulses: f64,

    /// Longest time between impulses while the flywheel is considered spinning (s)
    #[serde(default = "default_max_time_between_impulses")]
    pub maximum_time_between_impulses: f64,

    /// Window of the median filter applied to raw impulse times
    #[serde(default = "default_smoothing")]
    pub smoothing: usize,

    /// Impulses in the detection window (flank)
    #[serde(default = "default_flank_length")]
    pub flank_length: usize,

    /// Minimum goodness of fit for an unpowered flank
    #[serde(default = "default_min_stroke_quality")]
    pub minimum_stroke_quality: f64,

    /// Slope of impulse time vs. time above which the flywheel is unpowered
    #[serde(default)]
    pub minimum_recovery_slope: f64,

    /// Learn the recovery slope threshold from measured recoveries
    #[serde(default)]
    pub auto_adjust_recovery_slope: bool,

    /// Fraction below the measured recovery slope used as threshold
    #[serde(default = "default_recovery_slope_margin")]
    pub auto_adjust_recovery_slope_margin: f64,

    /// Shortest credible drive (s)
    #[serde(default = "default_min_drive_time")]
    pub minimum_drive_time: f64,

    /// Shortest credible recovery (s)
    #[serde(default = "default_min_recovery_time")]
    pub minimum_recovery_time: f64,

    /// Moment of inertia of the flywheel (kg·m²)
    #[serde(default = "default_flywheel_inertia")]
    pub flywheel_inertia: f64,

    /// Initial drag factor in display units (N·m·s² × 10⁶)
    #[serde(default = "default_drag_factor")]
    pub drag_factor: f64,

    /// Re-estimate the drag factor from each recovery
    #[serde(default)]
    pub auto_adjust_drag_factor: bool,

    /// Number of recoveries the drag factor median is taken over
    #[serde(default = "default_drag_factor_smoothing")]
    pub drag_factor_smoothing: usize,

    /// Minimum goodness of fit of a recovery before it updates the drag factor
    #[serde(default = "default_min_drag_quality")]
    pub minimum_drag_quality: f64,

    /// Boat constant converting flywheel speed to boat speed (2.8 for a single scull)
    #[serde(default = "default_magic_constant")]
    pub magic_constant: f64,

    /// Time after a drive start without a new drive before the session pauses (s)
    #[serde(default = "default_max_stroke_time_before_pause")]
    pub maximum_stroke_time_before_pause: f64,
}

fn default_profile() -> String { RowerProfile::Default.name().to_string() }
fn default_impulses_per_revolution() -> u32 { 1 }
fn default_sprocket_radius() -> f64 { 3.0 }
fn default_min_time_between_impulses() -> f64 { 0.014 }
fn default_max_time_between_impulses() -> f64 { 0.5 }
fn default_smoothing() -> usize { 1 }
fn default_flank_length() -> usize { 6 }
fn default_min_stroke_quality() -> f64 { 0.6 }
fn default_recovery_slope_margin() -> f64 { 0.15 }
fn default_min_drive_time() -> f64 { 0.300 }
fn default_min_recovery_time() -> f64 { 0.900 }
fn default_flywheel_inertia() -> f64 { 0.5 }
fn default_drag_factor() -> f64 { 1500.0 }
fn default_drag_factor_smoothing() -> usize { 5 }
fn default_min_drag_quality() -> f64 { 0.83 }
fn default_magic_constant() -> f64 { 2.8 }
fn default_max_stroke_time_before_pause() -> f64 { 6.0 }

impl Default for RowerSettings {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            num_of_impulses_per_revolution: default_impulses_per_revolution(),
            sprocket_radius_cm: default_sprocket_radius(),
            minimum_force_before_stroke: 0.0,
            minimum_time_between_impulses: default_min_time_between_impulses(),
            maximum_time_between_impulses: default_max_time_between_impulses(),
            smoothing: default_smoothing(),
            flank_length: default_flank_length(),
            minimum_stroke_quality: default_min_stroke_quality(),
            minimum_recovery_slope: 0.0,
            auto_adjust_recovery_slope: false,
            auto_adjust_recovery_slope_margin: default_recovery_slope_margin(),
            minimum_drive_time: default_min_drive_time(),
            minimum_recovery_time: default_min_recovery_time(),
            flywheel_inertia: default_flywheel_inertia(),
            drag_factor: default_drag_factor(),
            auto_adjust_drag_factor: false,
            drag_factor_smoothing: default_drag_factor_smoothing(),
            minimum_drag_quality: default_min_drag_quality(),
            magic_constant: default_magic_constant(),
            maximum_stroke_time_before_pause: default_max_stroke_time_before_pause(),
        }
    }
}

impl RowerSettings {
    /// Flywheel rotation between two impulses (rad).
    pub fn angular_displacement_per_impulse(&self) -> f64 {
        (2.0 * PI) / f64::from(self.num_of_impulses_per_revolution.max(1))
    }

    pub fn sprocket_radius_m(&self) -> f64 {
        self.sprocket_radius_cm / 100.0
    }

    /// Torque equivalent of `minimum_force_before_stroke` (N·m).
    pub fn minimum_torque_before_stroke(&self) -> f64 {
        self.minimum_force_before_stroke * self.sprocket_radius_m()
    }

    /// Configured drag factor in SI units (N·m·s²).
    pub fn drag_factor_si(&self) -> f64 {
        self.drag_factor / DRAG_FACTOR_DISPLAY_SCALE
    }

    /// Shortest credible stroke cycle (s).
    pub fn minimum_stroke_time(&self) -> f64 {
        self.minimum_drive_time + self.minimum_recovery_time
    }

    /// Longest credible stroke cycle (s).
    pub fn maximum_stroke_time(&self) -> f64 {
        self.maximum_stroke_time_before_pause
    }
}

// ============================================================================
// User
// ============================================================================

/// Biological sex, used by the pace-based VO2max formulas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    #[default]
    Male,
    Female,
}

/// The person rowing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSettings {
    /// Resting heart rate (bpm)
    #[serde(default = "default_resting_hr")]
    pub resting_hr: f64,

    /// Maximum heart rate (bpm)
    #[serde(default = "default_max_hr")]
    pub max_hr: f64,

    /// Lowest power considered for VO2max (W)
    #[serde(default = "default_min_power")]
    pub min_power: f64,

    /// Highest credible power (W)
    #[serde(default = "default_max_power")]
    pub max_power: f64,

    /// Body weight (kg)
    #[serde(default = "default_weight")]
    pub weight_kg: f64,

    #[serde(default)]
    pub sex: Sex,

    /// Selects the formulas for competitive rowers
    #[serde(default)]
    pub highly_trained: bool,
}

fn default_resting_hr() -> f64 { 40.0 }
fn default_max_hr() -> f64 { 180.0 }
fn default_min_power() -> f64 { 50.0 }
fn default_max_power() -> f64 { 500.0 }
fn default_weight() -> f64 { 80.0 }

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            resting_hr: default_resting_hr(),
            max_hr: default_max_hr(),
            min_power: default_min_power(),
            max_power: default_max_power(),
            weight_kg: default_weight(),
            sex: Sex::default(),
            highly_trained: false,
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// Smoothing and timing of the session-level metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Strokes the displayed stroke metrics are smoothed over
    #[serde(default = "default_phases_for_averaging")]
    pub phases_for_averaging: usize,

    /// Interval of the display metrics update (ms)
    #[serde(default = "default_web_update_interval")]
    pub web_update_interval_ms: u64,

    /// Interval of the peripheral metrics update (ms)
    #[serde(default = "default_peripheral_update_interval")]
    pub peripheral_update_interval_ms: u64,

    /// Heart rate is dropped when not refreshed within this time (s)
    #[serde(default = "default_heart_rate_timeout")]
    pub heart_rate_timeout_secs: f64,

    /// Spacing of the post-exercise heart-rate recovery samples (s)
    #[serde(default = "default_recovery_heart_rate_interval")]
    pub recovery_heart_rate_interval_secs: u64,
}

fn default_phases_for_averaging() -> usize { 6 }
fn default_web_update_interval() -> u64 { 1000 }
fn default_peripheral_update_interval() -> u64 { 1000 }
fn default_heart_rate_timeout() -> f64 { 6.0 }
fn default_recovery_heart_rate_interval() -> u64 { 60 }

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            phases_for_averaging: default_phases_for_averaging(),
            web_update_interval_ms: default_web_update_interval(),
            peripheral_update_interval_ms: default_peripheral_update_interval(),
            heart_rate_timeout_secs: default_heart_rate_timeout(),
            recovery_heart_rate_interval_secs: default_recovery_heart_rate_interval(),
        }
    }
}

impl SessionSettings {
    /// Web interval clamped to what displays can keep up with.
    pub fn effective_web_update_interval_ms(&self) -> u64 {
        self.web_update_interval_ms.clamp(1, MAX_WEB_UPDATE_INTERVAL_MS)
    }

    /// Peripheral interval clamped to what BLE/ANT+ receivers expect.
    pub fn effective_peripheral_update_interval_ms(&self) -> u64 {
        self.peripheral_update_interval_ms
            .clamp(1, MAX_PERIPHERAL_UPDATE_INTERVAL_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default_config() {
        let config = RowingConfig::from_toml_str("").unwrap();
        assert_eq!(config.rower.profile, "default");
        assert_eq!(config.rower.flank_length, 6);
        assert_eq!(config.session.phases_for_averaging, 6);
        assert_eq!(config.user.sex, Sex::Male);
    }

    #[test]
    fn test_profile_with_override() {
        let config = RowingConfig::from_toml_str(
            r#"
            [rower]
            profile = "concept2_rowerg"
            drag_factor = 125.0
            "#,
        )
        .unwrap();
        assert_eq!(config.rower.profile, "concept2_rowerg");
        assert_eq!(config.rower.num_of_impulses_per_revolution, 6, "preset value kept");
        assert_eq!(config.rower.drag_factor, 125.0, "explicit key wins over preset");
    }

    #[test]
    fn test_unknown_profile_rejected() {
        let err = RowingConfig::from_toml_str("[rower]\nprofile = \"bathtub\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownProfile(ref name) if name == "bathtub"));
    }

    #[test]
    fn test_integer_values_accepted_for_floats() {
        let config = RowingConfig::from_toml_str("[user]\nweight_kg = 72\nmax_hr = 190\n").unwrap();
        assert_eq!(config.user.weight_kg, 72.0);
        assert_eq!(config.user.max_hr, 190.0);
    }

    #[test]
    fn test_derived_rower_quantities() {
        let rower = RowerProfile::Concept2RowErg.settings();
        assert!((rower.angular_displacement_per_impulse() - PI / 3.0).abs() < 1e-12);
        assert!((rower.sprocket_radius_m() - 0.014).abs() < 1e-12);
        assert!((rower.minimum_torque_before_stroke() - 0.14).abs() < 1e-12);
        assert!((rower.drag_factor_si() - 0.000_11).abs() < 1e-12);
        assert!((rower.minimum_stroke_time() - 1.3).abs() < 1e-12);
    }

    #[test]
    fn test_update_intervals_are_clamped() {
        let session = SessionSettings {
            web_update_interval_ms: 5000,
            peripheral_update_interval_ms: 1500,
            ..SessionSettings::default()
        };
        assert_eq!(session.effective_web_update_interval_ms(), 2000);
        assert_eq!(session.effective_peripheral_update_interval_ms(), 1000);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = RowingConfig {
            rower: RowerProfile::Concept2RowErg.settings(),
            ..RowingConfig::default()
        };
        let text = config.to_toml().unwrap();
        let parsed = RowingConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed.rower.flank_length, 12);
        assert_eq!(parsed.rower.profile, "concept2_rowerg");
    }
}
