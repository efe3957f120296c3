//! Backend-agnostic gallery renderer.
//!
//! [`SceneRenderer`] owns the perspective camera, the lighting rig, the
//! current scene and the viewport. Each `render` culls mesh nodes against the
//! view frustum and issues exactly one draw to a [`RenderBackend`]. The
//! [`TextBackend`] describes frames as text for headless use; the GPU backend
//! lives in `gallery-render-wgpu`.

mod backend;
mod camera;
mod lighting;
mod scene_renderer;
mod text;

pub use backend::{DrawItem, FrameView, RenderBackend, RenderError};
pub use camera::{Frustum, PerspectiveCamera};
pub use lighting::{
    AmbientLight, BACKGROUND, DirectionalLight, LightingRig, QualityPreset, ShadowSettings, hex_rgb,
};
pub use scene_renderer::{RenderStats, SceneRenderer};
pub use text::TextBackend;
