//! Query results and query parameters.
//!
//! [`CollisionResult`] is what a single collidable reports about a capsule;
//! [`CollisionHitResult`] is what the sweep engine hands to movement code
//! after placing that report on the trace.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::flags::CollisionMask;

/// Identifier of a collidable registered in a broad phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CollidableId(pub u32);

/// Raw answer from a collidable's capsule test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CollisionResult {
    /// Whether the capsule touches the collidable at all.
    pub has_collision: bool,
    /// Fraction of the sweep delta at which contact happens (0 for overlaps).
    pub time: f32,
    /// Distance travelled along the sweep before contact.
    pub distance: f32,
    /// Contact normal, pointing from the surface towards the capsule.
    pub normal: Vec3,
    /// Normal of the obstacle face that most opposes the sweep.
    pub impact_normal: Vec3,
    /// Contact point on the obstacle.
    pub impact_point: Vec3,
    /// The capsule already overlapped the collidable at the start.
    pub start_penetrating: bool,
    /// Overlap depth when `start_penetrating` is set.
    pub penetration_depth: f32,
}

impl CollisionResult {
    /// Result for a capsule that does not touch the collidable.
    pub fn miss() -> Self {
        Self {
            has_collision: false,
            time: 1.0,
            distance: 0.0,
            normal: Vec3::ZERO,
            impact_normal: Vec3::ZERO,
            impact_point: Vec3::ZERO,
            start_penetrating: false,
            penetration_depth: 0.0,
        }
    }
}

/// A single intersection found by the sweep engine.
///
/// `location` is the capsule centre at the time of impact, `impact_point`
/// the contact on the obstacle. A hit is treated as immutable once produced;
/// the only sanctioned edit is [`merge_line_metadata`](Self::merge_line_metadata).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CollisionHitResult {
    /// Capsule centre at the start of the trace.
    pub trace_start: Vec3,
    /// Requested capsule centre at the end of the trace.
    pub trace_end: Vec3,
    /// Something blocked the trace.
    pub blocking_hit: bool,
    /// The capsule overlapped geometry before moving.
    pub start_penetrating: bool,
    /// Fraction of the trace completed, in [0, 1].
    pub time: f32,
    /// Distance from `trace_start` to `location`.
    pub distance: f32,
    /// Capsule centre at the time of impact.
    pub location: Vec3,
    /// Contact point on the obstacle.
    pub impact_point: Vec3,
    /// Surface normal pointing towards the capsule.
    pub normal: Vec3,
    /// Face normal of the obstacle that most opposes the trace.
    pub impact_normal: Vec3,
    /// Overlap depth when `start_penetrating` is set.
    pub penetration_depth: f32,
    /// Which collidable was hit.
    pub collidable: Option<CollidableId>,
}

impl CollisionHitResult {
    /// A trace from `start` to `end` that hit nothing.
    pub fn no_hit(start: Vec3, end: Vec3) -> Self {
        Self {
            trace_start: start,
            trace_end: end,
            blocking_hit: false,
            start_penetrating: false,
            time: 1.0,
            distance: (end - start).length(),
            location: end,
            impact_point: Vec3::ZERO,
            normal: Vec3::ZERO,
            impact_normal: Vec3::ZERO,
            penetration_depth: 0.0,
            collidable: None,
        }
    }

    /// Place a collidable's raw result on the trace `start..end`.
    pub fn from_result(start: Vec3, end: Vec3, id: CollidableId, result: &CollisionResult) -> Self {
        let delta = end - start;
        let time = if result.start_penetrating {
            0.0
        } else {
            result.time.clamp(0.0, 1.0)
        };
        Self {
            trace_start: start,
            trace_end: end,
            blocking_hit: true,
            start_penetrating: result.start_penetrating,
            time,
            distance: delta.length() * time,
            location: start + delta * time,
            impact_point: result.impact_point,
            normal: result.normal,
            impact_normal: result.impact_normal,
            penetration_depth: if result.start_penetrating {
                result.penetration_depth.max(0.0)
            } else {
                0.0
            },
            collidable: Some(id),
        }
    }

    /// Check whether the trace hit anything.
    #[inline]
    pub fn is_valid_blocking_hit(&self) -> bool {
        self.blocking_hit && !self.start_penetrating
    }

    /// Trace direction, or zero for a stationary query.
    pub fn trace_direction(&self) -> Vec3 {
        (self.trace_end - self.trace_start).normalize_or_zero()
    }

    /// Combine a supplementary line trace (`self`) with the sweep it refines.
    ///
    /// The sweep's trace metadata (endpoints, time, location, impact point)
    /// overrides this hit's; the line trace's normals and collidable are kept.
    pub fn merge_line_metadata(&mut self, sweep: &CollisionHitResult) {
        self.trace_start = sweep.trace_start;
        self.trace_end = sweep.trace_end;
        self.time = sweep.time;
        self.location = sweep.location;
        self.impact_point = sweep.impact_point;
    }
}

/// Configuration shared by every sweep and overlap query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CollisionParams {
    /// Groups the query collides with.
    pub mask: CollisionMask,
    /// Maximum number of hits to return.
    pub max_hits: usize,
    /// Only return the earliest hit.
    pub closest_only: bool,
}

impl CollisionParams {
    /// Hits against every group in `mask`, sorted, up to `max_hits`.
    pub fn multi(mask: CollisionMask) -> Self {
        Self {
            mask,
            max_hits: 16,
            closest_only: false,
        }
    }

    /// Only the first blocking hit against `mask`.
    pub fn closest(mask: CollisionMask) -> Self {
        Self {
            mask,
            max_hits: 1,
            closest_only: true,
        }
    }
}

impl Default for CollisionParams {
    fn default() -> Self {
        Self::multi(CollisionMask::MASK_MOVEMENT)
    }
}
