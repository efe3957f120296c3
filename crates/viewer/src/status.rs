//! User-facing status text, derived from typed state only.

use gallery_assets::ReportedPercent;
use serde::Serialize;

/// Where the session's asset is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AssetState {
    Unloaded,
    Loading { percent: ReportedPercent },
    Loaded { url: String, digest: String },
    /// Load failed and nothing replaced it.
    Failed { message: String },
    /// Load failed and the fallback primitive is shown.
    Fallback { message: String },
}

impl AssetState {
    pub fn text(&self) -> String {
        match self {
            AssetState::Unloaded => "Waiting for model".to_string(),
            AssetState::Loading { percent } => format!("Loading 3D model... {}%", percent.value()),
            AssetState::Loaded { .. } => "Model loaded".to_string(),
            AssetState::Failed { message } => format!("Error: {message}"),
            AssetState::Fallback { .. } => "Model unavailable, showing fallback".to_string(),
        }
    }
}

pub fn lock_text(locked: bool) -> &'static str {
    if locked {
        "WASD navigation active"
    } else {
        "Click to activate WASD"
    }
}

/// Snapshot of everything a status overlay shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewerStatus {
    pub asset: String,
    pub lock: String,
    pub locked: bool,
    pub frames: u64,
    pub fps: f32,
}

impl ViewerStatus {
    pub fn lines(&self) -> [String; 3] {
        [
            self.asset.clone(),
            self.lock.clone(),
            format!("{} frames, {:.0} fps", self.frames, self.fps),
        ]
    }
}
