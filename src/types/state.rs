//! Stroke and session state enums.

use serde::{Deserialize, Serialize};

// ============================================================================
// Stroke Phase
// ============================================================================

/// Phase of the current stroke, owned by the rower.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "camelCase")]
pub enum StrokeState {
    #[default]
    WaitingForDrive,
    Drive,
    Recovery,
    /// Absorbing state, left only through an explicit `allow_movement`.
    Stopped,
}

impl StrokeState {
    pub const ALL: [Self; 4] = [Self::WaitingForDrive, Self::Drive, Self::Recovery, Self::Stopped];
}

impl std::fmt::Display for StrokeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WaitingForDrive => write!(f, "Waiting for drive"),
            Self::Drive => write!(f, "Drive"),
            Self::Recovery => write!(f, "Recovery"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

// ============================================================================
// Session Status
// ============================================================================

/// Lifecycle of a rowing session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    #[default]
    WaitingForStart,
    Rowing,
    Paused,
    /// Terminal until the session is reset.
    Stopped,
}

impl SessionStatus {
    pub const ALL: [Self; 4] = [Self::WaitingForStart, Self::Rowing, Self::Paused, Self::Stopped];
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WaitingForStart => write!(f, "Waiting for start"),
            Self::Rowing => write!(f, "Rowing"),
            Self::Paused => write!(f, "Paused"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}
