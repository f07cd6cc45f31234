//! Impulse processing engine.
//!
//! Three layers, each owning the next:
//!
//! - [`RowingStatistics`]: session state, intervals, smoothed metrics
//! - [`Rower`]: drive/recovery stroke phases and linear physics
//! - [`Flywheel`]: angular kinematics and drag from raw impulse timing
//!
//! Every impulse runs through all three before the next one is accepted.
//! Nothing here performs I/O or returns an error; degenerate input degrades
//! to "no phase change".

pub mod flywheel;
pub mod rower;
pub mod statistics;

pub use flywheel::Flywheel;
pub use rower::{stroke_transition, Rower, StrokeSignals, StrokeTransition};
pub use statistics::{session_transition, RowingStatistics, SessionTransition};
