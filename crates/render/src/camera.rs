use glam::{Mat4, Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// Perspective projection parameters. The aspect ratio follows the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerspectiveCamera {
    pub fov_degrees: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for PerspectiveCamera {
    fn default() -> Self {
        Self {
            fov_degrees: 75.0,
            aspect: 16.0 / 9.0,
            near: 0.01,
            far: 1000.0,
        }
    }
}

impl PerspectiveCamera {
    pub fn new(fov_degrees: f32, near: f32, far: f32) -> Self {
        Self {
            fov_degrees,
            near,
            far,
            ..Self::default()
        }
    }

    /// Recompute the aspect ratio. A zero-sized viewport keeps the previous one.
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }

    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_degrees.to_radians(), self.aspect, self.near, self.far)
    }
}

/// Six clip planes extracted from a view-projection matrix (0..1 depth).
#[derive(Debug, Clone, Copy)]
pub struct Frustum {
    planes: [Vec4; 6],
}

impl Frustum {
    pub fn from_view_projection(m: &Mat4) -> Self {
        let r0 = m.row(0);
        let r1 = m.row(1);
        let r2 = m.row(2);
        let r3 = m.row(3);
        let planes = [r3 + r0, r3 - r0, r3 + r1, r3 - r1, r2, r3 - r2].map(|p| {
            let len = p.truncate().length();
            if len > 0.0 { p / len } else { p }
        });
        Self { planes }
    }

    /// Conservative: true unless the sphere lies entirely outside one plane.
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|p| p.truncate().dot(center) + p.w >= -radius)
    }
}
