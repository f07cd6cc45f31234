//! Numeric Series Primitives
//!
//! Small, allocation-bounded containers that every per-impulse computation
//! in the engine is built on. Each primitive holds at most a fixed number of
//! samples (except where explicitly unbounded), so processing one impulse costs
//! O(window) regardless of session length.
//!
//! ## Primitives
//!
//! - [`BoundedSeries`]: sliding window with sum/median/min/max/threshold counts
//! - [`OlsLinearSeries`]: ordinary least squares regression over a window
//! - [`TsQuadraticSeries`]: Theil-Sen style robust quadratic regression
//! - [`WeightedSeries`]: weighted average accumulator
//! - [`StreamFilter`]: median noise filter with a fallback default
//! - [`CurveMetrics`]: per-phase force/velocity/power curve accumulator
//! - [`CurveAligner`]: trims near-zero noise from the ends of a curve
//! - [`BucketedLinearSeries`]: bracketed regression used for VO2max

mod bounded;
mod bucketed;
mod curve_aligner;
mod curve_metrics;
mod ols;
mod quadratic;
mod stream_filter;
mod weighted;

pub use bounded::BoundedSeries;
pub use bucketed::BucketedLinearSeries;
pub use curve_aligner::CurveAligner;
pub use curve_metrics::CurveMetrics;
pub use ols::OlsLinearSeries;
pub use quadratic::TsQuadraticSeries;
pub use stream_filter::StreamFilter;
pub use weighted::WeightedSeries;
