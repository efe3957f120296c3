use gallery_assets::SceneGraph;
use glam::{Mat4, Vec3};

use crate::lighting::LightingRig;

/// Errors a backend can report from a frame.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    /// Surface must be reconfigured; the frame is skipped.
    #[error("render surface lost")]
    SurfaceLost,
    /// Surface no longer matches the window; the frame is skipped.
    #[error("render surface outdated")]
    SurfaceOutdated,
    #[error("out of GPU memory")]
    OutOfMemory,
    #[error("backend error: {0}")]
    Backend(String),
    #[error("renderer already released")]
    Released,
}

impl RenderError {
    /// Transient errors are fixed by reconfiguring and trying again next frame.
    pub fn is_transient(&self) -> bool {
        matches!(self, RenderError::SurfaceLost | RenderError::SurfaceOutdated)
    }
}

/// One visible mesh node for this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawItem {
    pub node: usize,
    pub world: Mat4,
}

/// Everything a backend needs to draw one frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    pub frame: u64,
    pub viewport: (u32, u32),
    pub eye: Vec3,
    pub view: Mat4,
    pub projection: Mat4,
    pub rig: &'a LightingRig,
    pub draws: &'a [DrawItem],
    pub culled: usize,
}

impl FrameView<'_> {
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }
}

/// Drawing surface. Exactly one `draw` is issued per rendered frame.
pub trait RenderBackend {
    /// Resize the output immediately.
    fn resize(&mut self, width: u32, height: u32);

    /// Replace GPU-side scene resources. Node indices in later `DrawItem`s
    /// refer to `scene.nodes`.
    fn upload_scene(&mut self, scene: &SceneGraph) -> Result<(), RenderError>;

    fn draw(&mut self, frame: &FrameView<'_>) -> Result<(), RenderError>;

    /// Drop the surface and every uploaded resource.
    fn release(&mut self);
}
