//! Frame pacing for the render loop.
//!
//! # Invariants
//! - A hidden surface never runs frame work, regardless of elapsed time.
//! - Frame work averages the target rate, independent of the wake rate. A single
//!   gap may be shorter than the interval when wakes land late, but runs never
//!   bunch up to catch up after a long stall.
//! - Each scheduler owns its own rate; there is no global frame clock.
//!
//! Timestamps are plain `Duration`s since an arbitrary monotonic origin so the
//! scheduler can be driven by tests without a display.

mod scheduler;
mod timer;

pub use scheduler::{FrameConfig, FrameDecision, FrameScheduler, SchedulerStats, SkipReason};
pub use timer::FrameTimer;
