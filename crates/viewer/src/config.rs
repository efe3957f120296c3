//! Viewer configuration, read from an optional YAML file.
//!
//! Every field has a default, so an empty file (or no file) is a valid config.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use gallery_assets::{AssetLoader, LoadSettings};
use gallery_frame::FrameConfig;
use gallery_motion::{ContainmentConfig, MovementConfig};
use gallery_render::{PerspectiveCamera, QualityPreset};
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Errors from reading or validating a [`ViewerConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// What to show when the asset cannot be loaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Substitute the fallback cube and keep going.
    #[default]
    FallbackPrimitive,
    /// Leave the scene empty and show the error.
    ShowError,
}

/// What Escape does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscapePolicy {
    /// Release the pointer lock; never close.
    #[default]
    UnlockOnly,
    /// Release the pointer lock and close the viewer.
    UnlockAndClose,
}

impl EscapePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            EscapePolicy::UnlockOnly => "unlock_only",
            EscapePolicy::UnlockAndClose => "unlock_and_close",
        }
    }
}

impl fmt::Display for EscapePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EscapePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "unlock_only" | "unlock" => Ok(EscapePolicy::UnlockOnly),
            "unlock_and_close" | "close" => Ok(EscapePolicy::UnlockAndClose),
            other => Err(format!(
                "unknown escape policy '{other}' (expected unlock_only or unlock_and_close)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    pub url: String,
    pub on_failure: FailurePolicy,
    pub model_scale: f32,
    pub chunk_size: usize,
    pub indeterminate_bytes_per_percent: u64,
    pub timeout_secs: u64,
}

impl Default for AssetConfig {
    fn default() -> Self {
        let load = LoadSettings::default();
        Self {
            url: "assets/art-gallery.glb".into(),
            on_failure: FailurePolicy::default(),
            model_scale: load.model_scale,
            chunk_size: load.chunk_size,
            indeterminate_bytes_per_percent: 1_000_000,
            timeout_secs: load.timeout_secs,
        }
    }
}

impl AssetConfig {
    pub fn load_settings(&self) -> LoadSettings {
        LoadSettings {
            chunk_size: self.chunk_size,
            timeout_secs: self.timeout_secs,
            model_scale: self.model_scale,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementSection {
    #[serde(flatten)]
    pub tuning: MovementConfig,
    /// Keep the camera inside the loaded scene. Off unless present.
    pub containment: Option<ContainmentConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub position: Vec3,
    pub look_at: Option<Vec3>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        let camera = PerspectiveCamera::default();
        Self {
            fov_degrees: camera.fov_degrees,
            near: camera.near,
            far: camera.far,
            position: Vec3::new(0.0, 1.0, 2.0),
            look_at: None,
        }
    }
}

impl CameraConfig {
    pub fn camera(&self) -> PerspectiveCamera {
        PerspectiveCamera::new(self.fov_degrees, self.near, self.far)
    }
}

/// Refresh rate of the status overlay, independent of the render rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HudConfig {
    pub target_fps: u32,
}

impl Default for HudConfig {
    fn default() -> Self {
        Self { target_fps: 30 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub asset: AssetConfig,
    pub quality: QualityPreset,
    pub movement: MovementSection,
    pub camera: CameraConfig,
    pub frame: FrameConfig,
    pub hud: HudConfig,
    pub escape: EscapePolicy,
}

impl ViewerConfig {
    /// Read and validate a YAML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_yaml_str(&text)?;
        tracing::debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// The file at `path` if given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = if text.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(text)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Loader carrying this config's load settings and quality profile.
    pub fn asset_loader(&self) -> AssetLoader {
        AssetLoader::new(self.asset.load_settings(), self.quality.profile())
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));
        if self.asset.url.trim().is_empty() {
            return invalid("asset.url must not be empty");
        }
        if self.asset.chunk_size == 0 {
            return invalid("asset.chunk_size must be positive");
        }
        if !(self.asset.model_scale > 0.0) {
            return invalid("asset.model_scale must be positive");
        }
        if !(self.camera.fov_degrees > 0.0 && self.camera.fov_degrees < 180.0) {
            return invalid("camera.fov_degrees must be between 0 and 180");
        }
        if !(self.camera.near > 0.0 && self.camera.near < self.camera.far) {
            return invalid("camera.near must be positive and below camera.far");
        }
        if self.frame.target_fps == 0 || self.hud.target_fps == 0 {
            return invalid("target_fps must be at least 1");
        }
        if !(self.movement.tuning.max_step_secs > 0.0) {
            return invalid("movement.max_step_secs must be positive");
        }
        if !(self.movement.tuning.damping >= 0.0) {
            return invalid("movement.damping must not be negative");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_defaults() {
        let config = ViewerConfig::from_yaml_str("").expect("parse");
        assert_eq!(config, ViewerConfig::default());
        assert_eq!(config.asset.url, "assets/art-gallery.glb");
        assert_eq!(config.asset.on_failure, FailurePolicy::FallbackPrimitive);
        assert_eq!(config.asset.model_scale, 0.4);
        assert_eq!(config.asset.chunk_size, 65536);
        assert_eq!(config.frame.target_fps, 60);
        assert_eq!(config.hud.target_fps, 30);
        assert_eq!(config.escape, EscapePolicy::UnlockOnly);
        assert_eq!(config.quality, QualityPreset::High);
        assert!(config.movement.containment.is_none());
        assert_eq!(config.movement.tuning.acceleration, 20.0);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let yaml = r#"
asset:
  url: https://example.com/gallery.glb
  on_failure: show_error
quality: performance
movement:
  acceleration: 25.0
  containment:
    eye_height: 1.7
frame:
  target_fps: 30
escape: unlock_and_close
camera:
  position: [1.0, 2.0, 3.0]
  look_at: [0.0, 1.0, 0.0]
"#;
        let config = ViewerConfig::from_yaml_str(yaml).expect("parse");
        assert_eq!(config.asset.url, "https://example.com/gallery.glb");
        assert_eq!(config.asset.on_failure, FailurePolicy::ShowError);
        assert_eq!(config.asset.chunk_size, 65536);
        assert_eq!(config.quality, QualityPreset::Performance);
        assert_eq!(config.movement.tuning.acceleration, 25.0);
        assert_eq!(config.movement.tuning.damping, 10.0);
        let containment = config.movement.containment.expect("containment");
        assert_eq!(containment.eye_height, 1.7);
        assert_eq!(containment.margin, 0.5);
        assert_eq!(config.frame.target_fps, 30);
        assert_eq!(config.hud.target_fps, 30);
        assert_eq!(config.escape, EscapePolicy::UnlockAndClose);
        assert_eq!(config.camera.position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(config.camera.look_at, Some(Vec3::new(0.0, 1.0, 0.0)));
    }

    #[test]
    fn yaml_round_trip() {
        let mut config = ViewerConfig::default();
        config.escape = EscapePolicy::UnlockAndClose;
        config.movement.containment = Some(ContainmentConfig::default());
        let text = config.to_yaml().expect("serialize");
        assert_eq!(ViewerConfig::from_yaml_str(&text).expect("parse"), config);
    }

    #[test]
    fn invalid_values_are_rejected() {
        for yaml in [
            "frame:\n  target_fps: 0\n",
            "camera:\n  near: 10.0\n  far: 1.0\n",
            "asset:\n  chunk_size: 0\n",
            "asset:\n  url: ''\n",
            "movement:\n  damping: -1.0\n",
            "movement:\n  damping: .nan\n",
        ] {
            let err = ViewerConfig::from_yaml_str(yaml).expect_err(yaml);
            assert!(matches!(err, ConfigError::Invalid(_)), "{yaml}: {err}");
        }
    }

    #[test]
    fn malformed_yaml_is_yaml_error() {
        let err = ViewerConfig::from_yaml_str("quality: [").expect_err("malformed");
        assert!(matches!(err, ConfigError::Yaml(_)));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("viewer.yaml");
        std::fs::write(&path, "quality: performance\n").expect("write");
        let config = ViewerConfig::load(&path).expect("load");
        assert_eq!(config.quality, QualityPreset::Performance);

        let err = ViewerConfig::load(&dir.path().join("missing.yaml")).expect_err("missing");
        assert!(matches!(err, ConfigError::Io(_)));
        assert_eq!(ViewerConfig::load_or_default(None).expect("default"), ViewerConfig::default());
    }

    #[test]
    fn escape_policy_parses_aliases() {
        assert_eq!("unlock-only".parse::<EscapePolicy>(), Ok(EscapePolicy::UnlockOnly));
        assert_eq!("close".parse::<EscapePolicy>(), Ok(EscapePolicy::UnlockAndClose));
        assert!("explode".parse::<EscapePolicy>().is_err());
    }
}
