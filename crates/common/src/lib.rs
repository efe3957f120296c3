//! Shared spatial types used across the gallery viewer crates.

pub mod types;

pub use types::{Aabb, BoundingSphere, SessionId, Transform};
