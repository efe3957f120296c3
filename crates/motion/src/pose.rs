use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

const PITCH_LIMIT_DEGREES: f32 = 89.0;

/// Camera position plus yaw/pitch orientation.
///
/// Yaw is measured from +X toward +Z, so the default yaw of -90 degrees looks
/// down -Z. Roll is never applied, which keeps `right()` horizontal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraPose {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
}

impl Default for CameraPose {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 1.0, 2.0),
            yaw: -90.0_f32.to_radians(),
            pitch: 0.0,
        }
    }
}

impl CameraPose {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    /// Full view direction including pitch.
    pub fn forward(&self) -> Vec3 {
        Vec3::new(
            self.yaw.cos() * self.pitch.cos(),
            self.pitch.sin(),
            self.yaw.sin() * self.pitch.cos(),
        )
        .normalize()
    }

    /// View direction projected onto the ground plane.
    pub fn horizontal_forward(&self) -> Vec3 {
        Vec3::new(self.yaw.cos(), 0.0, self.yaw.sin())
    }

    pub fn right(&self) -> Vec3 {
        self.horizontal_forward().cross(Vec3::Y).normalize()
    }

    /// Move along the ground-plane view direction. Pitch does not lift or sink the camera.
    pub fn move_forward(&mut self, distance: f32) {
        self.position += self.horizontal_forward() * distance;
    }

    pub fn move_right(&mut self, distance: f32) {
        self.position += self.right() * distance;
    }

    /// Apply relative pointer movement scaled by `sensitivity` radians per unit.
    pub fn look(&mut self, dx: f32, dy: f32, sensitivity: f32) {
        self.yaw += dx * sensitivity;
        self.pitch -= dy * sensitivity;
        let limit = PITCH_LIMIT_DEGREES.to_radians();
        self.pitch = self.pitch.clamp(-limit, limit);
    }

    /// Orient toward `target`. A target at the camera position leaves the orientation as is.
    pub fn look_at(&mut self, target: Vec3) {
        let dir = (target - self.position).normalize_or_zero();
        if dir == Vec3::ZERO {
            return;
        }
        self.yaw = dir.z.atan2(dir.x);
        let limit = PITCH_LIMIT_DEGREES.to_radians();
        self.pitch = dir.y.clamp(-1.0, 1.0).asin().clamp(-limit, limit);
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.forward(), Vec3::Y)
    }
}
