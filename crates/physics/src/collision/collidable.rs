//! The collidable capability and a parry3d-backed implementation.
//!
//! Anything a unit can bump into implements [`Collidable`]. The trait has a
//! single required method so static level geometry, moving props and other
//! units can all answer the same question: "does this capsule, possibly
//! sweeping along `delta`, touch me?"
//!
//! [`Brush`] is the stock implementation used for level geometry. It wraps a
//! parry3d shape (box, convex hull or triangle mesh) placed by a transform.

use glam::{Quat, Vec3};
use parry3d::math::{Isometry, Point, Real, Vector};
use parry3d::na::{Quaternion, Translation3, UnitQuaternion};
use parry3d::query::{self, Contact, Ray, RayCast, ShapeCastOptions, ShapeCastStatus};
use parry3d::shape::{Capsule as ParryCapsule, SharedShape};
use thiserror::Error;

use super::hit::CollisionResult;
use super::shape::{Aabb, Capsule};

/// Components of a contact normal smaller than this are treated as zero
/// when picking an opposing box face.
const FACE_AXIS_EPSILON: f32 = 1.0e-4;

/// Probe length used to recover a face normal from a contact point.
const FACE_PROBE_DISTANCE: f32 = 0.01;

/// Largest gap a refined sweep may leave between capsule and brush.
const TOI_TOLERANCE: f32 = 1.0e-5;

/// Refinement steps per sweep before settling for the last clear time.
const MAX_TOI_REFINE_STEPS: usize = 32;

/// Errors raised while building collision geometry.
#[derive(Debug, Error)]
pub enum CollisionError {
    #[error("convex hull needs at least 4 non-coplanar points, got {0}")]
    DegenerateHull(usize),

    #[error("invalid triangle mesh: {0}")]
    InvalidMesh(String),

    #[error("unknown collidable {0}")]
    UnknownCollidable(u32),

    #[error("collidable {0} is not a brush")]
    NotABrush(u32),
}

/// Capability exposed by anything a unit capsule can collide with.
pub trait Collidable: Send + Sync {
    /// Test `capsule` against this object.
    ///
    /// A zero `delta` asks for a stationary overlap test; anything else is a
    /// sweep from `capsule` to `capsule + delta`. Results are appended to
    /// `out`; a miss appends nothing.
    fn test_capsule(&self, capsule: &Capsule, delta: Vec3, out: &mut Vec<CollisionResult>);
}

/// What kind of parry shape a brush wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrushKind {
    Cuboid,
    ConvexHull,
    TriMesh,
}

/// A piece of collision geometry: a parry3d shape with a world transform.
#[derive(Clone)]
pub struct Brush {
    shape: SharedShape,
    kind: BrushKind,
    transform: Isometry<Real>,
}

impl std::fmt::Debug for Brush {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Brush")
            .field("kind", &self.kind)
            .field("position", &self.position())
            .finish()
    }
}

impl Brush {
    /// Axis-aligned box.
    pub fn cuboid(center: Vec3, half_extents: Vec3) -> Self {
        Self::oriented_cuboid(center, Quat::IDENTITY, half_extents)
    }

    /// Box with an arbitrary orientation (ramps, tilted walls).
    pub fn oriented_cuboid(center: Vec3, rotation: Quat, half_extents: Vec3) -> Self {
        let half = half_extents.abs();
        Self {
            shape: SharedShape::cuboid(half.x, half.y, half.z),
            kind: BrushKind::Cuboid,
            transform: isometry(center, rotation),
        }
    }

    /// Convex hull of a world-space point cloud.
    pub fn convex_hull(points: &[Vec3]) -> Result<Self, CollisionError> {
        if !spans_volume(points) {
            return Err(CollisionError::DegenerateHull(points.len()));
        }
        let parry_points: Vec<Point<Real>> = points.iter().map(|p| to_point(*p)).collect();
        let shape = SharedShape::convex_hull(&parry_points)
            .ok_or(CollisionError::DegenerateHull(points.len()))?;

        Ok(Self {
            shape,
            kind: BrushKind::ConvexHull,
            transform: Isometry::identity(),
        })
    }

    /// Triangle mesh in world space.
    pub fn triangle_mesh(vertices: &[Vec3], indices: &[[u32; 3]]) -> Result<Self, CollisionError> {
        if vertices.is_empty() || indices.is_empty() {
            return Err(CollisionError::InvalidMesh("mesh has no triangles".to_string()));
        }
        if let Some(bad) = indices.iter().flatten().find(|i| **i as usize >= vertices.len()) {
            return Err(CollisionError::InvalidMesh(format!(
                "index {bad} out of range for {} vertices",
                vertices.len()
            )));
        }

        let parry_vertices: Vec<Point<Real>> = vertices.iter().map(|v| to_point(*v)).collect();
        let shape = SharedShape::trimesh(parry_vertices, indices.to_vec())
            .map_err(|e| CollisionError::InvalidMesh(format!("{e:?}")))?;

        Ok(Self {
            shape,
            kind: BrushKind::TriMesh,
            transform: Isometry::identity(),
        })
    }

    /// Shape kind.
    pub fn kind(&self) -> BrushKind {
        self.kind
    }

    /// World position of the brush origin.
    pub fn position(&self) -> Vec3 {
        from_vector(&self.transform.translation.vector)
    }

    /// Move the brush. Used for dynamic geometry between ticks.
    pub fn set_pose(&mut self, position: Vec3, rotation: Quat) {
        self.transform = isometry(position, rotation);
    }

    /// World-space bounding box.
    pub fn bounds(&self) -> Aabb {
        let aabb = self.shape.compute_aabb(&self.transform);
        Aabb::new(from_point(&aabb.mins), from_point(&aabb.maxs))
    }

    // ========================================================================
    // Queries
    // ========================================================================

    fn overlap(&self, capsule_shape: &ParryCapsule, capsule: &Capsule) -> Option<CollisionResult> {
        let contact = query::contact(
            &Isometry::identity(),
            capsule_shape,
            &self.transform,
            self.shape.as_ref(),
            0.0,
        )
        .ok()??;

        if contact.dist >= 0.0 {
            return None;
        }

        // normal1 points out of the capsule; the push-out direction is its opposite.
        let normal = -from_vector(&contact.normal1);
        let normal = if normal.length_squared() > 0.5 {
            normal
        } else {
            (capsule.center() - from_point(&contact.point2)).normalize_or(Vec3::Y)
        };

        Some(CollisionResult {
            has_collision: true,
            time: 0.0,
            distance: 0.0,
            normal,
            impact_normal: normal,
            impact_point: from_point(&contact.point2),
            start_penetrating: true,
            penetration_depth: -contact.dist,
        })
    }

    fn sweep(&self, capsule_shape: &ParryCapsule, delta: Vec3) -> Option<CollisionResult> {
        let options = ShapeCastOptions {
            max_time_of_impact: 1.0,
            target_distance: 0.0,
            stop_at_penetration: false,
            compute_impact_geometry_on_penetration: true,
        };

        let hit = query::cast_shapes(
            &Isometry::identity(),
            &to_vector(delta),
            capsule_shape,
            &self.transform,
            &Vector::zeros(),
            self.shape.as_ref(),
            options,
        )
        .ok()??;

        if matches!(hit.status, ShapeCastStatus::Failed) || hit.time_of_impact > 1.0 {
            return None;
        }

        let estimate = hit.time_of_impact.clamp(0.0, 1.0);
        let (time, contact) = self.refine_time_of_impact(capsule_shape, delta, estimate)?;

        let normal = -from_vector(&contact.normal1);
        let impact_point = from_point(&contact.point2);
        let local_normal = from_vector(&self.transform.rotation.inverse_transform_vector(&contact.normal2));
        let impact_normal = self.impact_normal(impact_point, normal, local_normal, delta);

        Some(CollisionResult {
            has_collision: true,
            time,
            distance: delta.length() * time,
            normal,
            impact_normal,
            impact_point,
            start_penetrating: false,
            penetration_depth: 0.0,
        })
    }

    /// Move a shape-cast time of impact onto the surface.
    ///
    /// The cast's own answer can sit millimetres short of the contact, which
    /// is enough to skew floor distances and step heights. Each step closes
    /// the measured gap along the contact normal. Overshooting into the brush
    /// bisects back toward the last clear time. The returned time leaves a
    /// gap in `[0, TOI_TOLERANCE]`, or `None` when the capsule clears the
    /// brush over the whole delta.
    fn refine_time_of_impact(&self, capsule_shape: &ParryCapsule, delta: Vec3, estimate: f32) -> Option<(f32, Contact)> {
        let length = delta.length();
        let prediction = length + TOI_TOLERANCE;

        let mut time = estimate;
        let mut clear_time = 0.0_f32;
        let mut clear_contact: Option<Contact> = None;
        let mut inside_time: Option<f32> = None;

        for _ in 0..MAX_TOI_REFINE_STEPS {
            let contact = query::contact(
                &isometry(delta * time, Quat::IDENTITY),
                capsule_shape,
                &self.transform,
                self.shape.as_ref(),
                prediction,
            )
            .ok()
            .flatten()?;

            if contact.dist < 0.0 {
                inside_time = Some(time);
                time = 0.5 * (clear_time + time);
                continue;
            }
            if contact.dist <= TOI_TOLERANCE {
                return Some((time, contact));
            }

            clear_time = time;
            let closing = from_vector(&contact.normal1).dot(delta);
            let step = if closing > f32::EPSILON {
                contact.dist / closing
            } else {
                contact.dist / length
            };
            clear_contact = Some(contact);

            let mut next = time + step;
            if let Some(inside) = inside_time {
                if next >= inside {
                    next = 0.5 * (time + inside);
                }
            }
            if next > 1.0 {
                if time >= 1.0 {
                    return None;
                }
                next = 1.0;
            }
            time = next;
        }

        clear_contact.map(|contact| (clear_time, contact))
    }

    /// Face normal of this brush that best explains a sweep contact.
    fn impact_normal(&self, impact_point: Vec3, normal: Vec3, local_normal: Vec3, delta: Vec3) -> Vec3 {
        match self.kind {
            BrushKind::Cuboid => self.box_opposing_normal(local_normal, delta).unwrap_or(normal),
            BrushKind::ConvexHull | BrushKind::TriMesh => {
                let dir = delta.normalize_or_zero();
                self.probe_face_normal(impact_point, dir)
                    .filter(|n| n.dot(dir) < 0.0)
                    .or_else(|| self.probe_face_normal(impact_point, -normal))
                    .unwrap_or(normal)
            }
        }
    }

    /// Among the box faces touching the contact, pick the one whose normal
    /// most opposes the sweep.
    fn box_opposing_normal(&self, local_normal: Vec3, delta: Vec3) -> Option<Vec3> {
        let local_dir = from_vector(&self.transform.rotation.inverse_transform_vector(&to_vector(delta)));

        let mut best: Option<(f32, Vec3)> = None;
        for axis in 0..3 {
            let face = if local_normal[axis] > FACE_AXIS_EPSILON {
                Vec3::AXES[axis]
            } else if local_normal[axis] < -FACE_AXIS_EPSILON {
                -Vec3::AXES[axis]
            } else {
                continue;
            };
            let opposing = local_dir.dot(face);
            if best.map_or(true, |(dot, _)| opposing < dot) {
                best = Some((opposing, face));
            }
        }

        best.map(|(_, face)| from_vector(&self.transform.rotation.transform_vector(&to_vector(face))))
    }

    fn probe_face_normal(&self, point: Vec3, dir: Vec3) -> Option<Vec3> {
        if dir.length_squared() < 0.5 {
            return None;
        }
        let ray = Ray::new(to_point(point - dir * FACE_PROBE_DISTANCE), to_vector(dir));
        self.shape
            .cast_ray_and_get_normal(&self.transform, &ray, FACE_PROBE_DISTANCE * 2.0, false)
            .map(|hit| from_vector(&hit.normal))
            .filter(|n| n.length_squared() > 0.5)
    }
}

impl Collidable for Brush {
    fn test_capsule(&self, capsule: &Capsule, delta: Vec3, out: &mut Vec<CollisionResult>) {
        let capsule_shape = ParryCapsule::new(to_point(capsule.a), to_point(capsule.b), capsule.radius);

        // Overlap at the start wins over any sweep result.
        if let Some(result) = self.overlap(&capsule_shape, capsule) {
            out.push(result);
            return;
        }

        if delta.length_squared() <= f32::EPSILON {
            return;
        }

        if let Some(result) = self.sweep(&capsule_shape, delta) {
            out.push(result);
        }
    }
}

// ============================================================================
// glam <-> nalgebra
// ============================================================================

#[inline]
pub(crate) fn to_point(v: Vec3) -> Point<Real> {
    Point::new(v.x, v.y, v.z)
}

#[inline]
pub(crate) fn to_vector(v: Vec3) -> Vector<Real> {
    Vector::new(v.x, v.y, v.z)
}

#[inline]
pub(crate) fn from_point(p: &Point<Real>) -> Vec3 {
    Vec3::new(p.x, p.y, p.z)
}

#[inline]
pub(crate) fn from_vector(v: &Vector<Real>) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

/// Check that a point cloud is not flat (it has some tetrahedral volume).
fn spans_volume(points: &[Vec3]) -> bool {
    let Some(&origin) = points.first() else {
        return false;
    };
    let far = points
        .iter()
        .copied()
        .max_by(|a, b| (*a - origin).length_squared().total_cmp(&(*b - origin).length_squared()))
        .unwrap_or(origin);
    let axis = far - origin;
    let normal = points
        .iter()
        .map(|p| axis.cross(*p - origin))
        .max_by(|a, b| a.length_squared().total_cmp(&b.length_squared()))
        .unwrap_or(Vec3::ZERO);
    if normal.length_squared() <= 1.0e-12 {
        return false;
    }
    let normal = normal.normalize();
    points.iter().any(|p| normal.dot(*p - origin).abs() > 1.0e-5)
}

fn isometry(position: Vec3, rotation: Quat) -> Isometry<Real> {
    let rotation = UnitQuaternion::from_quaternion(Quaternion::new(rotation.w, rotation.x, rotation.y, rotation.z));
    Isometry::from_parts(Translation3::new(position.x, position.y, position.z), rotation)
}
