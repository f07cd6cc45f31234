//! Rowing Configuration Module
//!
//! Machine, athlete and session settings loaded from TOML, replacing every
//! tuning constant the engine uses with a user-adjustable value.
//!
//! ## Loading Order
//!
//! 1. `ROWMETRICS_CONFIG` environment variable (path to TOML file)
//! 2. `rowmetrics.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Rower Profiles
//!
//! `[rower] profile = "concept2_rowerg"` selects a preset for a known
//! machine. Any other key in `[rower]` overrides the preset value.
//!
//! ## Usage
//!
//! The loaded config is passed explicitly to whatever needs it:
//!
//! ```ignore
//! let config = RowingConfig::load();
//! let mut statistics = RowingStatistics::new(&config);
//! ```

pub mod defaults;
mod profiles;
mod rowing_config;
pub mod validation;

pub use profiles::RowerProfile;
pub use rowing_config::*;
