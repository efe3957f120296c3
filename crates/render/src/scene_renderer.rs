use gallery_assets::SceneGraph;
use gallery_motion::CameraPose;
use tracing::{debug, info, trace, warn};

use crate::backend::{DrawItem, FrameView, RenderBackend, RenderError};
use crate::camera::{Frustum, PerspectiveCamera};
use crate::lighting::{LightingRig, QualityPreset};

/// Outcome of one `render` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub drawn: usize,
    pub culled: usize,
    /// The backend asked for a reconfigure; nothing reached the screen.
    pub skipped: bool,
}

/// Owns the camera, lighting rig, current scene and viewport, and drives a backend.
pub struct SceneRenderer<B: RenderBackend> {
    backend: B,
    camera: PerspectiveCamera,
    rig: LightingRig,
    scene: Option<SceneGraph>,
    viewport: (u32, u32),
    frames: u64,
    released: bool,
}

impl<B: RenderBackend> SceneRenderer<B> {
    pub fn new(
        mut backend: B,
        mut camera: PerspectiveCamera,
        preset: QualityPreset,
        width: u32,
        height: u32,
    ) -> Self {
        camera.set_viewport(width, height);
        backend.resize(width, height);
        Self {
            backend,
            camera,
            rig: preset.rig(),
            scene: None,
            viewport: (width, height),
            frames: 0,
            released: false,
        }
    }

    /// Upload `scene` and make it the one drawn from now on.
    pub fn set_scene(&mut self, scene: SceneGraph) -> Result<(), RenderError> {
        if self.released {
            return Err(RenderError::Released);
        }
        self.backend.upload_scene(&scene)?;
        info!(
            meshes = scene.mesh_count(),
            triangles = scene.triangle_count(),
            "scene uploaded"
        );
        self.scene = Some(scene);
        Ok(())
    }

    pub fn scene(&self) -> Option<&SceneGraph> {
        self.scene.as_ref()
    }

    /// Recompute aspect and resize the backend before the next draw.
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.released {
            return;
        }
        self.viewport = (width, height);
        self.camera.set_viewport(width, height);
        self.backend.resize(width, height);
        debug!(width, height, aspect = self.camera.aspect, "viewport resized");
    }

    /// Cull and issue exactly one backend draw.
    pub fn render(&mut self, pose: &CameraPose) -> Result<RenderStats, RenderError> {
        if self.released {
            return Err(RenderError::Released);
        }
        let view = pose.view_matrix();
        let projection = self.camera.projection();
        let frustum = Frustum::from_view_projection(&(projection * view));

        let mut draws = Vec::new();
        let mut culled = 0;
        if let Some(scene) = &self.scene {
            for (index, mesh) in scene.mesh_nodes() {
                let world = scene.world_matrix(index);
                if mesh.flags.frustum_culled {
                    if let Some(bounds) = mesh.bounds {
                        let sphere = bounds.sphere.transformed(&world);
                        if !frustum.intersects_sphere(sphere.center, sphere.radius) {
                            culled += 1;
                            continue;
                        }
                    }
                }
                draws.push(DrawItem { node: index, world });
            }
        }

        let frame = FrameView {
            frame: self.frames,
            viewport: self.viewport,
            eye: pose.position,
            view,
            projection,
            rig: &self.rig,
            draws: &draws,
            culled,
        };
        match self.backend.draw(&frame) {
            Ok(()) => {}
            Err(e) if e.is_transient() => {
                debug!(error = %e, "surface needs reconfigure, frame skipped");
                let (w, h) = self.viewport;
                self.backend.resize(w, h);
                return Ok(RenderStats {
                    drawn: 0,
                    culled,
                    skipped: true,
                });
            }
            Err(e) => {
                warn!(error = %e, "draw failed");
                return Err(e);
            }
        }
        self.frames += 1;
        trace!(frame = self.frames, drawn = draws.len(), culled, "frame rendered");
        Ok(RenderStats {
            drawn: draws.len(),
            culled,
            skipped: false,
        })
    }

    /// Release the backend and scene. Later calls are no-ops.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.backend.release();
        self.scene = None;
        self.released = true;
        info!(frames = self.frames, "renderer released");
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }

    pub fn camera(&self) -> &PerspectiveCamera {
        &self.camera
    }

    pub fn rig(&self) -> &LightingRig {
        &self.rig
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}
