//! Viewer controller: one owned session from mount to teardown.
//!
//! # Invariants
//! - All session state lives in one `ViewerSession`, built on mount and torn down exactly once.
//! - A load event is applied only if its ticket matches the session's current load.
//! - After `close`, every call on the controller is a no-op and `on_close` has run once.
//! - The camera pose only moves while the pointer is locked.

pub mod config;
pub mod controller;
pub mod host;
pub mod status;

pub use config::{
    AssetConfig, CameraConfig, ConfigError, EscapePolicy, FailurePolicy, HudConfig,
    MovementSection, ViewerConfig,
};
pub use controller::{FrameOutcome, LoadTicket, ViewerController, ViewerPhase, ViewerSession};
pub use host::{HeadlessHost, PointerLockHost};
pub use status::{AssetState, ViewerStatus, lock_text};

/// Errors surfaced by the controller. None of them end the host process.
#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    #[error("pointer lock denied: {0}")]
    PointerLockDenied(String),
    #[error("viewer is not mounted")]
    NotMounted,
    #[error("viewer is already mounted")]
    AlreadyMounted,
    #[error("viewer is closed")]
    Closed,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
