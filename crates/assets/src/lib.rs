//! Gallery asset loading.
//!
//! A single scene asset (binary glTF) is fetched from disk or over HTTP as a
//! lazy stream of progress events ending in exactly one terminal event. The
//! parsed scene is normalized against a [`QualityProfile`] before it is handed
//! to a renderer.

pub mod import;
pub mod loader;
pub mod profile;
pub mod progress;
pub mod scene;
pub mod source;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use loader::{
    AssetLoader, CancelToken, LoadEvent, LoadHandle, LoadSettings, LoadStream, SceneAsset,
    spawn_load, spawn_load_with,
};
pub use profile::{NormalizeReport, QualityProfile, normalize};
pub use progress::{LoadProgress, ProgressTracker, ReportedPercent};
pub use scene::{
    FilterMode, Material, MaterialBinding, MaterialId, MeshBounds, MeshFlags, MeshNode, Primitive,
    SceneGraph, SceneNode, SceneSummary, TextureBinding, TextureId, TextureImage, TextureSampling,
    TextureSlot,
};
pub use source::{AssetSource, ProbeReport};

/// Why a load did not produce a scene.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP status {status}")]
    Http { status: u16 },
    #[error("request failed: {0}")]
    Request(String),
    #[error("glTF parse error: {0}")]
    Parse(String),
    #[error("asset contains no renderable geometry")]
    NoGeometry,
    #[error("unsupported image format: {0}")]
    UnsupportedImage(String),
    #[error("load cancelled")]
    Cancelled,
}
