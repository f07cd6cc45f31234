//! System-wide default constants.
//!
//! Values that are not user tunable but are shared across subsystems.

// ============================================================================
// Session
// ============================================================================

/// Upper bound for the web/display metrics interval (ms).
pub const MAX_WEB_UPDATE_INTERVAL_MS: u64 = 2_000;

/// Upper bound for the peripheral metrics interval (ms).
pub const MAX_PERIPHERAL_UPDATE_INTERVAL_MS: u64 = 1_000;

/// Number of post-exercise heart-rate recovery samples (HRR0..HRR3).
pub const RECOVERY_HEART_RATE_SAMPLES: usize = 4;

// ============================================================================
// Physics
// ============================================================================

/// Display units of the drag factor: N·m·s² × 10⁶.
pub const DRAG_FACTOR_DISPLAY_SCALE: f64 = 1e6;

/// Standard rowing race distance used by the pace-based VO2max estimate (m).
pub const REFERENCE_RACE_DISTANCE_M: f64 = 2_000.0;

// ============================================================================
// Pipeline
// ============================================================================

/// Capacity of the broadcast channel carrying engine output.
pub const OUTPUT_CHANNEL_CAPACITY: usize = 256;
