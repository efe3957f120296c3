use crate::pose::CameraPose;
use gallery_common::Aabb;
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Hook run by the integrator after each applied displacement.
pub trait PostStepHook: Send {
    /// Adjust the pose after the step.
    fn after_step(&mut self, pose: &mut CameraPose);

    /// Called once the loaded scene's world bounds are known.
    fn on_scene_bounds(&mut self, _bounds: Aabb) {}
}

/// Parameters of [`BoundsContainment`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainmentConfig {
    /// Minimum camera height above the scene's lowest point.
    pub eye_height: f32,
    /// How far inside the scene bounds the camera must stay.
    pub margin: f32,
}

impl Default for ContainmentConfig {
    fn default() -> Self {
        Self {
            eye_height: 1.6,
            margin: 0.5,
        }
    }
}

/// Keeps the camera inside the loaded scene's bounds.
///
/// Not collision: the camera is lifted to eye height above the floor, and if
/// it leaves the shrunken scene box it is snapped back near the scene center.
/// Inert until scene bounds arrive.
#[derive(Debug, Clone, Default)]
pub struct BoundsContainment {
    config: ContainmentConfig,
    bounds: Option<Aabb>,
}

impl BoundsContainment {
    pub fn new(config: ContainmentConfig) -> Self {
        Self {
            config,
            bounds: None,
        }
    }

    pub fn bounds(&self) -> Option<Aabb> {
        self.bounds
    }
}

impl PostStepHook for BoundsContainment {
    fn after_step(&mut self, pose: &mut CameraPose) {
        let Some(bounds) = self.bounds else {
            return;
        };

        let eye_level = bounds.min.y + self.config.eye_height;
        if pose.position.y < eye_level {
            pose.position.y = eye_level;
        }

        let room = bounds.expanded(-self.config.margin);
        if !room.contains(pose.position) {
            let center = bounds.center();
            pose.position = Vec3::new(center.x, center.y - self.config.margin, center.z);
            tracing::debug!(?center, "camera left scene bounds, recentered");
        }
    }

    fn on_scene_bounds(&mut self, bounds: Aabb) {
        if !bounds.is_empty() {
            self.bounds = Some(bounds);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room() -> Aabb {
        Aabb::new(Vec3::new(-5.0, 0.0, -5.0), Vec3::new(5.0, 4.0, 5.0))
    }

    #[test]
    fn inert_without_bounds() {
        let mut hook = BoundsContainment::default();
        let mut pose = CameraPose::at(Vec3::new(100.0, -3.0, 0.0));
        hook.after_step(&mut pose);
        assert_eq!(pose.position, Vec3::new(100.0, -3.0, 0.0));
    }

    #[test]
    fn lifts_camera_to_eye_level() {
        let mut hook = BoundsContainment::new(ContainmentConfig::default());
        hook.on_scene_bounds(room());
        let mut pose = CameraPose::at(Vec3::new(1.0, 0.2, 1.0));
        hook.after_step(&mut pose);
        assert!((pose.position.y - 1.6).abs() < 1e-6);
        assert_eq!(pose.position.x, 1.0);
    }

    #[test]
    fn recenters_when_outside() {
        let mut hook = BoundsContainment::new(ContainmentConfig::default());
        hook.on_scene_bounds(room());
        let mut pose = CameraPose::at(Vec3::new(4.8, 1.6, 0.0));
        hook.after_step(&mut pose);
        assert_eq!(pose.position, Vec3::new(0.0, 1.5, 0.0));
    }

    #[test]
    fn empty_bounds_are_ignored() {
        let mut hook = BoundsContainment::default();
        hook.on_scene_bounds(Aabb::EMPTY);
        assert!(hook.bounds().is_none());
    }
}
