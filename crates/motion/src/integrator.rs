use crate::containment::PostStepHook;
use crate::pose::CameraPose;
use gallery_common::Aabb;
use gallery_input::InputSnapshot;
use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Tunables for the movement integrator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    /// Acceleration applied along each held axis, in units per second squared.
    pub acceleration: f32,
    /// Exponential damping rate per second.
    pub damping: f32,
    /// Longest step a single tick may integrate.
    pub max_step_secs: f32,
    /// Radians of look rotation per unit of relative pointer movement.
    pub look_sensitivity: f32,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            acceleration: 20.0,
            damping: 10.0,
            max_step_secs: 0.1,
            look_sensitivity: 0.002,
        }
    }
}

impl MovementConfig {
    /// Settings of the full-page walkthrough, which accelerates harder.
    pub fn walkthrough() -> Self {
        Self {
            acceleration: 25.0,
            ..Self::default()
        }
    }
}

/// Horizontal velocity in camera-local axes: `x` strafes, `z` walks.
///
/// Both components are negated when applied, matching the sign convention of
/// the integrator (holding forward drives `z` negative).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub x: f32,
    pub z: f32,
}

impl Velocity {
    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.z == 0.0
    }
}

/// Result of one integrator tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Pointer not locked: nothing was integrated and velocity is frozen.
    Skipped,
    /// The pose moved by `displacement` in world space (before post-step hooks).
    Moved { displacement: Vec3 },
}

/// Converts held keys plus elapsed time into a damped camera displacement.
pub struct MovementIntegrator {
    config: MovementConfig,
    hooks: Vec<Box<dyn PostStepHook>>,
}

impl Default for MovementIntegrator {
    fn default() -> Self {
        Self::new(MovementConfig::default())
    }
}

impl MovementIntegrator {
    pub fn new(config: MovementConfig) -> Self {
        Self {
            config,
            hooks: Vec::new(),
        }
    }

    pub fn config(&self) -> &MovementConfig {
        &self.config
    }

    /// Register a hook run after every applied displacement.
    pub fn add_hook(&mut self, hook: Box<dyn PostStepHook>) {
        self.hooks.push(hook);
    }

    /// Forward the loaded scene's world bounds to every hook.
    pub fn set_scene_bounds(&mut self, bounds: Aabb) {
        for hook in &mut self.hooks {
            hook.on_scene_bounds(bounds);
        }
    }

    /// Advance one tick of `dt_secs`.
    ///
    /// Skipped entirely while the pointer is unlocked. Negative or NaN steps
    /// integrate as zero; steps above `max_step_secs` are clamped.
    pub fn tick(
        &mut self,
        dt_secs: f32,
        input: &InputSnapshot,
        velocity: &mut Velocity,
        pose: &mut CameraPose,
    ) -> TickOutcome {
        if !input.pointer_locked {
            return TickOutcome::Skipped;
        }

        let dt = if dt_secs.is_finite() {
            dt_secs.clamp(0.0, self.config.max_step_secs)
        } else {
            0.0
        };

        let keep = (1.0 - self.config.damping * dt).clamp(0.0, 1.0);
        velocity.x *= keep;
        velocity.z *= keep;

        let direction = Vec2::new(
            axis(input.right, input.left),
            axis(input.forward, input.backward),
        )
        .normalize_or_zero();

        if input.forward || input.backward {
            velocity.z -= direction.y * self.config.acceleration * dt;
        }
        if input.left || input.right {
            velocity.x -= direction.x * self.config.acceleration * dt;
        }

        let before = pose.position;
        pose.move_right(-velocity.x * dt);
        pose.move_forward(-velocity.z * dt);
        let displacement = pose.position - before;

        for hook in &mut self.hooks {
            hook.after_step(pose);
        }

        tracing::trace!(dt, vx = velocity.x, vz = velocity.z, "movement tick");
        TickOutcome::Moved { displacement }
    }
}

fn axis(positive: bool, negative: bool) -> f32 {
    f32::from(u8::from(positive)) - f32::from(u8::from(negative))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locked() -> InputSnapshot {
        InputSnapshot {
            pointer_locked: true,
            ..InputSnapshot::default()
        }
    }

    fn origin_pose() -> CameraPose {
        CameraPose::at(Vec3::ZERO)
    }

    #[test]
    fn unlocked_tick_is_skipped_and_velocity_frozen() {
        let mut integrator = MovementIntegrator::default();
        let mut velocity = Velocity { x: 1.0, z: -2.0 };
        let mut pose = origin_pose();
        let input = InputSnapshot {
            forward: true,
            ..InputSnapshot::default()
        };
        let outcome = integrator.tick(0.016, &input, &mut velocity, &mut pose);
        assert_eq!(outcome, TickOutcome::Skipped);
        assert_eq!(velocity, Velocity { x: 1.0, z: -2.0 });
        assert_eq!(pose.position, Vec3::ZERO);
    }

    #[test]
    fn free_decay_never_reverses_sign() {
        let mut integrator = MovementIntegrator::default();
        let mut velocity = Velocity { x: -3.0, z: 4.0 };
        let mut pose = origin_pose();
        let mut last_step = f32::INFINITY;
        for _ in 0..30 {
            let before = pose.position;
            integrator.tick(0.016, &locked(), &mut velocity, &mut pose);
            let step = pose.position - before;
            assert!(velocity.x <= 0.0 && velocity.z >= 0.0);
            // -vx strafes right (+X), -vz walks backward (+Z for the default yaw).
            assert!(step.x >= 0.0);
            assert!(step.z >= 0.0);
            assert!(step.length() < last_step);
            last_step = step.length();
        }
    }

    #[test]
    fn large_steps_stop_instead_of_reversing() {
        let mut integrator = MovementIntegrator::default();
        let mut velocity = Velocity { x: -3.0, z: 4.0 };
        let mut pose = origin_pose();
        for dt in [0.1, 0.3, 2.0] {
            integrator.tick(dt, &locked(), &mut velocity, &mut pose);
            assert!(velocity.x <= 0.0 && velocity.z >= 0.0);
        }
        assert!(velocity.is_zero());
    }

    #[test]
    fn zero_direction_is_not_nan() {
        let mut integrator = MovementIntegrator::default();
        for dt in [0.0, 0.001, 0.016, 1.0] {
            let mut velocity = Velocity::default();
            let mut pose = origin_pose();
            let outcome = integrator.tick(dt, &locked(), &mut velocity, &mut pose);
            assert_eq!(outcome, TickOutcome::Moved { displacement: Vec3::ZERO });
            assert!(!pose.position.is_nan());
            assert!(velocity.is_zero());
        }
    }

    #[test]
    fn opposite_keys_cancel() {
        let mut integrator = MovementIntegrator::default();
        let mut velocity = Velocity::default();
        let mut pose = origin_pose();
        let input = InputSnapshot {
            forward: true,
            backward: true,
            pointer_locked: true,
            ..InputSnapshot::default()
        };
        integrator.tick(0.016, &input, &mut velocity, &mut pose);
        assert_eq!(pose.position, Vec3::ZERO);
    }

    #[test]
    fn forward_moves_along_view_direction() {
        let mut integrator = MovementIntegrator::default();
        let mut velocity = Velocity::default();
        let mut pose = origin_pose();
        let input = InputSnapshot {
            forward: true,
            pointer_locked: true,
            ..InputSnapshot::default()
        };
        for _ in 0..10 {
            integrator.tick(0.016, &input, &mut velocity, &mut pose);
        }
        assert!(velocity.z < 0.0);
        assert!(pose.position.z < 0.0);
        assert!(pose.position.x.abs() < 1e-6);
    }

    #[test]
    fn diagonal_is_normalized() {
        let config = MovementConfig::default();
        let mut integrator = MovementIntegrator::new(config);
        let mut velocity = Velocity::default();
        let mut pose = origin_pose();
        let input = InputSnapshot {
            forward: true,
            right: true,
            pointer_locked: true,
            ..InputSnapshot::default()
        };
        integrator.tick(0.05, &input, &mut velocity, &mut pose);
        let expected = config.acceleration * 0.05 * std::f32::consts::FRAC_1_SQRT_2;
        assert!((velocity.x + expected).abs() < 1e-5);
        assert!((velocity.z + expected).abs() < 1e-5);
    }

    #[test]
    fn oversized_step_is_clamped() {
        let mut a = MovementIntegrator::default();
        let mut b = MovementIntegrator::default();
        let input = InputSnapshot {
            right: true,
            pointer_locked: true,
            ..InputSnapshot::default()
        };
        let (mut va, mut vb) = (Velocity::default(), Velocity::default());
        let (mut pa, mut pb) = (origin_pose(), origin_pose());
        a.tick(5.0, &input, &mut va, &mut pa);
        b.tick(0.1, &input, &mut vb, &mut pb);
        assert_eq!(va, vb);
        assert_eq!(pa.position, pb.position);
    }

    #[test]
    fn hooks_run_after_step_once_bounds_are_known() {
        use crate::containment::{BoundsContainment, ContainmentConfig};

        let mut integrator = MovementIntegrator::default();
        integrator.add_hook(Box::new(BoundsContainment::new(ContainmentConfig::default())));
        let mut velocity = Velocity::default();
        let mut pose = origin_pose();

        integrator.tick(0.016, &locked(), &mut velocity, &mut pose);
        assert_eq!(pose.position, Vec3::ZERO);

        integrator.set_scene_bounds(Aabb::new(
            Vec3::new(-10.0, 0.0, -10.0),
            Vec3::new(10.0, 5.0, 10.0),
        ));
        integrator.tick(0.016, &locked(), &mut velocity, &mut pose);
        assert!((pose.position.y - 1.6).abs() < 1e-5);
    }

    #[test]
    fn walkthrough_accelerates_harder() {
        assert_eq!(MovementConfig::walkthrough().acceleration, 25.0);
        assert_eq!(MovementConfig::default().acceleration, 20.0);
    }
}
