use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of one viewer session, from mount to teardown.
///
/// Only used to correlate log output; sessions never look each other up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0.simple().to_string()[..8])
    }
}

/// Spatial transform: position, rotation, scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_scale(scale: f32) -> Self {
        Self {
            scale: Vec3::splat(scale),
            ..Self::default()
        }
    }

    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

/// Axis-aligned bounding box.
///
/// An empty box has `min > max` on every axis so that the first `include`
/// collapses it onto the point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Aabb {
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Smallest box containing every point, or `None` for an empty iterator.
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut aabb = Self::EMPTY;
        for p in points {
            aabb.include(p);
        }
        (!aabb.is_empty()).then_some(aabb)
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn include(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn contains(&self, p: Vec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

    /// Grow (positive) or shrink (negative) the box by `amount` on every side.
    ///
    /// Shrinking past the center leaves an empty box.
    pub fn expanded(&self, amount: f32) -> Aabb {
        Aabb {
            min: self.min - Vec3::splat(amount),
            max: self.max + Vec3::splat(amount),
        }
    }

    /// Bounds of this box after transforming its eight corners.
    pub fn transformed(&self, m: &Mat4) -> Aabb {
        if self.is_empty() {
            return *self;
        }
        let mut out = Aabb::EMPTY;
        for i in 0..8 {
            let corner = Vec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            out.include(m.transform_point3(corner));
        }
        out
    }
}

/// Bounding sphere, centered on the box center of the points it encloses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl BoundingSphere {
    pub fn from_points(points: &[Vec3]) -> Option<Self> {
        let aabb = Aabb::from_points(points.iter().copied())?;
        let center = aabb.center();
        let radius = points
            .iter()
            .map(|p| p.distance_squared(center))
            .fold(0.0_f32, f32::max)
            .sqrt();
        Some(Self { center, radius })
    }

    /// Sphere after an affine transform; the radius scales by the largest axis scale.
    pub fn transformed(&self, m: &Mat4) -> BoundingSphere {
        let (scale, _, _) = m.to_scale_rotation_translation();
        BoundingSphere {
            center: m.transform_point3(self.center),
            radius: self.radius * scale.abs().max_element(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_uniqueness() {
        let a = SessionId::new();
        let b = SessionId::new();
        assert_ne!(a, b);
        assert_eq!(a.to_string().len(), 8);
    }

    #[test]
    fn transform_default_is_identity() {
        let t = Transform::default();
        assert_eq!(t.position, Vec3::ZERO);
        assert_eq!(t.rotation, Quat::IDENTITY);
        assert_eq!(t.scale, Vec3::ONE);
        assert_eq!(t.to_matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn aabb_from_points() {
        let aabb = Aabb::from_points([Vec3::new(1.0, -2.0, 0.0), Vec3::new(-1.0, 3.0, 4.0)]).unwrap();
        assert_eq!(aabb.min, Vec3::new(-1.0, -2.0, 0.0));
        assert_eq!(aabb.max, Vec3::new(1.0, 3.0, 4.0));
        assert_eq!(aabb.center(), Vec3::new(0.0, 0.5, 2.0));
        assert!(Aabb::from_points(std::iter::empty()).is_none());
    }

    #[test]
    fn aabb_shrink_and_contains() {
        let aabb = Aabb::new(Vec3::splat(-2.0), Vec3::splat(2.0));
        let inner = aabb.expanded(-0.5);
        assert!(inner.contains(Vec3::splat(1.5)));
        assert!(!inner.contains(Vec3::splat(1.6)));
        assert!(aabb.expanded(-3.0).is_empty());
    }

    #[test]
    fn aabb_transformed_by_scale() {
        let aabb = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let scaled = aabb.transformed(&Mat4::from_scale(Vec3::splat(0.5)));
        assert_eq!(scaled.min, Vec3::splat(-0.5));
        assert_eq!(scaled.max, Vec3::splat(0.5));
    }

    #[test]
    fn bounding_sphere_encloses_points() {
        let pts = [Vec3::new(-1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0)];
        let sphere = BoundingSphere::from_points(&pts).unwrap();
        for p in pts {
            assert!(p.distance(sphere.center) <= sphere.radius + 1e-5);
        }
        let moved = sphere.transformed(&Mat4::from_scale(Vec3::splat(2.0)));
        assert!((moved.radius - sphere.radius * 2.0).abs() < 1e-5);
    }
}
