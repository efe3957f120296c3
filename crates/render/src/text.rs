use std::fmt::Write as _;

use gallery_assets::{SceneGraph, SceneSummary};

use crate::backend::{FrameView, RenderBackend, RenderError};

/// Headless backend that describes each frame as text.
///
/// Used by the CLI and by tests that need a renderer without a GPU.
#[derive(Debug, Default)]
pub struct TextBackend {
    viewport: (u32, u32),
    scene: Option<SceneSummary>,
    last_frame: Option<String>,
    draw_calls: u64,
    uploads: u32,
    releases: u32,
}

impl TextBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draw_calls(&self) -> u64 {
        self.draw_calls
    }

    pub fn uploads(&self) -> u32 {
        self.uploads
    }

    pub fn releases(&self) -> u32 {
        self.releases
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    pub fn scene(&self) -> Option<&SceneSummary> {
        self.scene.as_ref()
    }

    pub fn last_frame(&self) -> Option<&str> {
        self.last_frame.as_deref()
    }
}

impl RenderBackend for TextBackend {
    fn resize(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
    }

    fn upload_scene(&mut self, scene: &SceneGraph) -> Result<(), RenderError> {
        if self.releases > 0 {
            return Err(RenderError::Released);
        }
        self.scene = Some(scene.summary());
        self.uploads += 1;
        Ok(())
    }

    fn draw(&mut self, frame: &FrameView<'_>) -> Result<(), RenderError> {
        if self.releases > 0 {
            return Err(RenderError::Released);
        }
        let mut out = String::new();
        let _ = writeln!(
            out,
            "=== Frame {} ({}x{}) ===",
            frame.frame, self.viewport.0, self.viewport.1
        );
        let _ = writeln!(
            out,
            "Camera: eye=({:.2}, {:.2}, {:.2})",
            frame.eye.x, frame.eye.y, frame.eye.z
        );
        let _ = writeln!(
            out,
            "Lights: ambient x{:.1}, {} directional, shadows {}",
            frame.rig.ambient.intensity,
            frame.rig.directionals.len(),
            if frame.rig.shadows_enabled() { "on" } else { "off" }
        );
        match &self.scene {
            Some(s) => {
                let _ = writeln!(
                    out,
                    "Scene: {} meshes, {} triangles",
                    s.meshes, s.triangles
                );
            }
            None => out.push_str("Scene: empty\n"),
        }
        let _ = writeln!(out, "Draws: {} visible, {} culled", frame.draws.len(), frame.culled);
        for item in frame.draws {
            let p = item.world.w_axis;
            let _ = writeln!(out, "  [node {}] at ({:.2}, {:.2}, {:.2})", item.node, p.x, p.y, p.z);
        }

        self.last_frame = Some(out);
        self.draw_calls += 1;
        Ok(())
    }

    fn release(&mut self) {
        self.scene = None;
        self.last_frame = None;
        self.releases += 1;
    }
}
