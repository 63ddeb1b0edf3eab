//! Geometric primitives used by movement queries.

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Dimensions of an upright unit capsule.
///
/// The capsule is a vertical pill: a segment along Y swept by `radius`.
/// `half_height` is measured from the centre to the tip of either cap, so it
/// is never smaller than `radius`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapsuleShape {
    /// Radius of the cylinder and both caps.
    pub radius: f32,
    /// Centre to cap tip.
    pub half_height: f32,
}

impl CapsuleShape {
    /// Standard humanoid unit: 0.35m radius, 1.8m tall.
    pub const HUMANOID: Self = Self {
        radius: 0.35,
        half_height: 0.9,
    };

    /// Create a capsule shape, clamping the half height up to the radius.
    pub fn new(radius: f32, half_height: f32) -> Self {
        let radius = radius.max(0.0);
        Self {
            radius,
            half_height: half_height.max(radius),
        }
    }

    /// Half length of the inner segment (excluding the caps).
    #[inline]
    pub fn segment_half_length(&self) -> f32 {
        (self.half_height - self.radius).max(0.0)
    }

    /// Place this shape with its centre at `center`.
    #[inline]
    pub fn at(&self, center: Vec3) -> Capsule {
        Capsule::upright(center, self.half_height, self.radius)
    }

    /// True when the shape has no volume to speak of.
    #[inline]
    pub fn is_nearly_zero(&self) -> bool {
        self.radius <= 1.0e-4 && self.half_height <= 1.0e-4
    }
}

impl Default for CapsuleShape {
    fn default() -> Self {
        Self::HUMANOID
    }
}

/// A capsule in world space: two segment endpoints plus a radius.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Capsule {
    /// Lower segment endpoint (centre of the lower cap).
    pub a: Vec3,
    /// Upper segment endpoint (centre of the upper cap).
    pub b: Vec3,
    /// Radius of the swept sphere.
    pub radius: f32,
}

impl Capsule {
    /// Build an upright capsule around `center`.
    pub fn upright(center: Vec3, half_height: f32, radius: f32) -> Self {
        let half_segment = (half_height - radius).max(0.0);
        Self {
            a: center - Vec3::Y * half_segment,
            b: center + Vec3::Y * half_segment,
            radius,
        }
    }

    /// Midpoint of the segment.
    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.a + self.b) * 0.5
    }

    /// Half length of the inner segment.
    #[inline]
    pub fn segment_half_length(&self) -> f32 {
        (self.b - self.a).length() * 0.5
    }

    /// Centre to cap tip.
    #[inline]
    pub fn half_height(&self) -> f32 {
        self.segment_half_length() + self.radius
    }

    /// Same capsule moved by `delta`.
    #[inline]
    pub fn translated(&self, delta: Vec3) -> Self {
        Self {
            a: self.a + delta,
            b: self.b + delta,
            radius: self.radius,
        }
    }

    /// Lowest point of the capsule.
    #[inline]
    pub fn bottom(&self) -> Vec3 {
        self.a.min(self.b) - Vec3::Y * self.radius
    }

    /// Bounding box of the capsule at rest.
    pub fn bounds(&self) -> Aabb {
        let r = Vec3::splat(self.radius);
        Aabb::new(self.a.min(self.b) - r, self.a.max(self.b) + r)
    }

    /// Bounding box of the capsule swept along `delta`.
    pub fn swept_bounds(&self, delta: Vec3) -> Aabb {
        self.bounds().union(&self.translated(delta).bounds())
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum corner.
    pub min: Vec3,
    /// Maximum corner.
    pub max: Vec3,
}

impl Aabb {
    /// Create a box from its corners. The corners are re-ordered if needed.
    pub fn new(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Create a box from centre and half extents.
    pub fn from_center(center: Vec3, half_extents: Vec3) -> Self {
        let half = half_extents.abs();
        Self {
            min: center - half,
            max: center + half,
        }
    }

    /// Smallest box containing both.
    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Grow the box by `margin` on every side.
    pub fn expanded(&self, margin: f32) -> Aabb {
        let m = Vec3::splat(margin);
        Aabb {
            min: self.min - m,
            max: self.max + m,
        }
    }

    /// Check whether two boxes overlap (touching counts).
    #[inline]
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.cmple(other.max).all() && other.min.cmple(self.max).all()
    }

    /// Check whether a point lies inside the box.
    #[inline]
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.min.cmple(point).all() && point.cmple(self.max).all()
    }

    /// Centre of the box.
    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Half size in each axis.
    #[inline]
    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }
}
