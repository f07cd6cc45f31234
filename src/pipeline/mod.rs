//! Session Pipeline
//!
//! ```text
//! ImpulseSource ──forward_impulses──┐
//! heart-rate strap ─────────────────┼─ mpsc ─▶ SessionLoop ─ broadcast ─▶ subscribers
//! operator commands ────────────────┘             │
//!                                                 └ web / peripheral ticks, HR expiry, HRR schedule
//! ```
//!
//! The engine itself is synchronous; this module is the only place that
//! knows about tasks, channels and timers.

mod recorder;
pub mod processing_loop;
pub mod source;

pub use processing_loop::{forward_impulses, EngineInput, SessionCommand, SessionLoop, SessionOutput, SessionSummary};
pub use recorder::ImpulseRecorder;
pub use source::{parse_impulse_line, ImpulseEvent, ImpulseSource, ReplaySource, SourceError, StdinSource};
