//! rowmetrics: rowing-machine metrics from flywheel impulses
//!
//! Turns the time between two consecutive flywheel sensor impulses into
//! stroke phases, linear rowing physics and session metrics.
//!
//! ## Architecture
//!
//! - **Series**: bounded regression and filtering primitives
//! - **Engine**: flywheel kinematics, stroke state machine, session state machine
//! - **VO2max**: end-of-session fitness estimate
//! - **Pipeline**: impulse sources and the async session loop around the engine
//! - **Simulation**: flywheel physics producing deterministic impulse streams

pub mod config;
pub mod engine;
pub mod flank;
pub mod pipeline;
pub mod series;
pub mod simulation;
pub mod types;
pub mod vo2max;

// Re-export configuration
pub use config::{ConfigError, RowerProfile, RowerSettings, RowingConfig, SessionSettings, UserSettings};

// Re-export the engine
pub use engine::{Flywheel, Rower, RowingStatistics};

// Re-export commonly used types
pub use types::{
    EngineEvent, HeartRateMeasurement, IntervalSetting, MetricsSnapshot, MetricsTrigger, SessionStatus,
    StrokeRecord, StrokeState,
};

pub use pipeline::{EngineInput, SessionCommand, SessionLoop, SessionOutput};
pub use simulation::{FlywheelSimulator, SimulatorSettings, StrokeProfile};
pub use vo2max::Vo2MaxEstimator;
