//! Input state for first-person navigation.
//!
//! # Invariants
//! - Only the four movement directions and the pointer-lock flag are tracked.
//! - Key events are applied in delivery order; repeats and unmatched releases are no-ops.
//! - Pointer-lock side effects (cursor, overlays) belong to the controller, not here.

pub mod keys;
pub mod state;

pub use keys::MoveKey;
pub use state::{InputSnapshot, InputState};
