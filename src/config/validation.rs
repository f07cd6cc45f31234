//! Config validation: unknown-key detection with Levenshtein suggestions
//! and physical range checks.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree, compare against known field names, and emit warnings
//! with "did you mean?" suggestions. Then proceed with normal serde
//! deserialization and range checks on the typed config.

use std::collections::HashSet;

use super::RowingConfig;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns the complete set of valid dotted key paths for `RowingConfig`.
///
/// Must be kept in step with the structs in rowing_config.rs.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [rower]
        "rower",
        "rower.profile",
        "rower.num_of_impulses_per_revolution",
        "rower.sprocket_radius_cm",
        "rower.minimum_force_before_stroke",
        "rower.minimum_time_between_impulses",
        "rower.maximum_time_between_impulses",
        "rower.smoothing",
        "rower.flank_length",
        "rower.minimum_stroke_quality",
        "rower.minimum_recovery_slope",
        "rower.auto_adjust_recovery_slope",
        "rower.auto_adjust_recovery_slope_margin",
        "rower.minimum_drive_time",
        "rower.minimum_recovery_time",
        "rower.flywheel_inertia",
        "rower.drag_factor",
        "rower.auto_adjust_drag_factor",
        "rower.drag_factor_smoothing",
        "rower.minimum_drag_quality",
        "rower.magic_constant",
        "rower.maximum_stroke_time_before_pause",
        // [user]
        "user",
        "user.resting_hr",
        "user.max_hr",
        "user.min_power",
        "user.max_power",
        "user.weight_kg",
        "user.sex",
        "user.highly_trained",
        // [session]
        "session",
        "session.phases_for_averaging",
        "session.web_update_interval_ms",
        "session.peripheral_update_interval_ms",
        "session.heart_rate_timeout_secs",
        "session.recovery_heart_rate_interval_secs",
    ];
    keys.iter().copied().collect()
}

/// Recursively collect dotted key paths from a TOML value.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_chars.len()]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|k| (*k, levenshtein(unknown, k)))
        .filter(|(_, dist)| *dist <= 3)
        .min_by(|(ka, da), (kb, db)| da.cmp(db).then_with(|| ka.cmp(kb)))
        .map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// Unknown keys never fail loading; syntax errors are left for serde to report.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let Ok(value) = raw_toml.parse::<toml::Value>() else {
        return Vec::new();
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Physical Range Validation
// ============================================================================

fn check_range(value: f64, min: f64, max: f64, field: &str, unit: &str, errors: &mut Vec<String>) {
    if !value.is_finite() {
        errors.push(format!("{field} = {value} must be a finite number"));
    } else if value < min || value > max {
        errors.push(format!(
            "{field} = {value} is outside physical range ({min}-{max}{unit})"
        ));
    }
}

fn check_positive(value: f64, field: &str, errors: &mut Vec<String>) {
    if !value.is_finite() || value <= 0.0 {
        errors.push(format!("{field} = {value} must be > 0"));
    }
}

fn warn(field: &str, message: String) -> ValidationWarning {
    ValidationWarning {
        field: field.to_string(),
        message,
        suggestion: None,
    }
}

/// Validate physical ranges on a parsed `RowingConfig`.
///
/// Returns `(errors, warnings)`. Errors make the config unusable; warnings
/// flag values that are possible but unusual.
pub fn validate_physical_ranges(config: &RowingConfig) -> (Vec<String>, Vec<ValidationWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let r = &config.rower;

    if r.num_of_impulses_per_revolution == 0 {
        errors.push("rower.num_of_impulses_per_revolution must be at least 1".to_string());
    }
    check_range(r.sprocket_radius_cm, f64::MIN_POSITIVE, 20.0, "rower.sprocket_radius_cm", " cm", &mut errors);
    check_range(r.minimum_force_before_stroke, 0.0, 500.0, "rower.minimum_force_before_stroke", " N", &mut errors);
    check_range(r.minimum_time_between_impulses, f64::MIN_POSITIVE, 3.0, "rower.minimum_time_between_impulses", " s", &mut errors);
    check_range(r.maximum_time_between_impulses, f64::MIN_POSITIVE, 3.0, "rower.maximum_time_between_impulses", " s", &mut errors);
    if r.maximum_time_between_impulses <= r.minimum_time_between_impulses {
        errors.push(format!(
            "rower.maximum_time_between_impulses ({}) must be greater than minimum_time_between_impulses ({})",
            r.maximum_time_between_impulses, r.minimum_time_between_impulses
        ));
    }
    if r.smoothing == 0 {
        errors.push("rower.smoothing must be at least 1".to_string());
    }
    if r.flank_length < 3 {
        errors.push(format!(
            "rower.flank_length = {} must be at least 3 (quadratic fit needs three points)",
            r.flank_length
        ));
    }
    check_range(r.minimum_stroke_quality, 0.0, 1.0, "rower.minimum_stroke_quality", "", &mut errors);
    check_range(r.minimum_recovery_slope, 0.0, f64::MAX, "rower.minimum_recovery_slope", "", &mut errors);
    check_range(r.auto_adjust_recovery_slope_margin, 0.0, 1.0, "rower.auto_adjust_recovery_slope_margin", "", &mut errors);
    check_positive(r.minimum_drive_time, "rower.minimum_drive_time", &mut errors);
    check_positive(r.minimum_recovery_time, "rower.minimum_recovery_time", &mut errors);
    check_positive(r.flywheel_inertia, "rower.flywheel_inertia", &mut errors);
    check_range(r.drag_factor, 1.0, f64::MAX, "rower.drag_factor", "", &mut errors);
    if r.drag_factor_smoothing == 0 {
        errors.push("rower.drag_factor_smoothing must be at least 1".to_string());
    }
    check_range(r.minimum_drag_quality, 0.0, 1.0, "rower.minimum_drag_quality", "", &mut errors);
    check_positive(r.magic_constant, "rower.magic_constant", &mut errors);
    check_range(r.maximum_stroke_time_before_pause, 3.0, 60.0, "rower.maximum_stroke_time_before_pause", " s", &mut errors);

    if r.drag_factor < 50.0 || r.drag_factor > 2000.0 {
        warnings.push(warn(
            "rower.drag_factor",
            format!(
                "drag_factor = {} is outside the typical range (50-2000)",
                r.drag_factor
            ),
        ));
    }
    if r.auto_adjust_recovery_slope && !r.auto_adjust_drag_factor {
        warnings.push(warn(
            "rower.auto_adjust_recovery_slope",
            "auto_adjust_recovery_slope only takes effect together with auto_adjust_drag_factor".to_string(),
        ));
    }

    let u = &config.user;
    check_range(u.resting_hr, 30.0, 220.0, "user.resting_hr", " bpm", &mut errors);
    check_range(u.max_hr, u.resting_hr, 220.0, "user.max_hr", " bpm", &mut errors);
    check_range(u.min_power, 1.0, 500.0, "user.min_power", " W", &mut errors);
    check_range(u.max_power, 100.0, 6000.0, "user.max_power", " W", &mut errors);
    check_range(u.weight_kg, 25.0, 500.0, "user.weight_kg", " kg", &mut errors);
    if u.min_power >= u.max_power {
        errors.push(format!(
            "user.min_power ({}) must be below user.max_power ({})",
            u.min_power, u.max_power
        ));
    }

    let s = &config.session;
    if s.phases_for_averaging < 2 {
        errors.push(format!(
            "session.phases_for_averaging = {} must be at least 2",
            s.phases_for_averaging
        ));
    }
    if s.web_update_interval_ms == 0 || s.peripheral_update_interval_ms == 0 {
        errors.push("session update intervals must be > 0 ms".to_string());
    }
    check_positive(s.heart_rate_timeout_secs, "session.heart_rate_timeout_secs", &mut errors);
    if s.web_update_interval_ms != s.effective_web_update_interval_ms() {
        warnings.push(warn(
            "session.web_update_interval_ms",
            format!(
                "web_update_interval_ms = {} will be clamped to {}",
                s.web_update_interval_ms,
                s.effective_web_update_interval_ms()
            ),
        ));
    }
    if s.peripheral_update_interval_ms != s.effective_peripheral_update_interval_ms() {
        warnings.push(warn(
            "session.peripheral_update_interval_ms",
            format!(
                "peripheral_update_interval_ms = {} will be clamped to {}",
                s.peripheral_update_interval_ms,
                s.effective_peripheral_update_interval_ms()
            ),
        ));
    }

    (errors, warnings)
}

// ============================================================================
// Tests
// ============================================================================
