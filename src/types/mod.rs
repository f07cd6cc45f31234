//! Shared types for the rowing engine.

mod metrics;
mod state;

pub use metrics::*;
pub use state::*;
