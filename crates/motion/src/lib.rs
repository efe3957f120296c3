//! First-person movement: camera pose, pointer look, and the per-tick integrator.
//!
//! # Invariants
//! - The pose position only changes inside a tick that saw `pointer_locked == true`.
//! - Velocity is never decayed while unlocked; it resumes where it stopped.
//! - Damping never reverses the sign of a velocity component.
//! - Containment is a post-step hook, not part of the integration itself.

mod containment;
mod integrator;
mod pose;

pub use containment::{BoundsContainment, ContainmentConfig, PostStepHook};
pub use integrator::{MovementConfig, MovementIntegrator, TickOutcome, Velocity};
pub use pose::CameraPose;
