//! Sweep engine.
//!
//! Capsule sweeps and overlap tests against everything a [`BroadPhase`]
//! returns for the swept bounds. Hits are ordered by time of impact, then
//! by deeper penetration, then by collidable id, so that two simulations of
//! the same unit over the same geometry see the same hits in the same order.

use std::cmp::Ordering;

use glam::Vec3;

use super::hit::{CollisionHitResult, CollisionParams, CollisionResult};
use super::shape::CapsuleShape;
use super::world::BroadPhase;

/// Radius of the degenerate capsule used for line traces.
pub const LINE_TRACE_RADIUS: f32 = 0.001;

/// Extra margin added to every broad phase query.
const QUERY_MARGIN: f32 = 0.01;

/// Sweep `shape` from `start` to `end` and collect every hit.
///
/// A zero-length sweep is an overlap query.
pub fn sweep_multi(
    world: &dyn BroadPhase,
    start: Vec3,
    end: Vec3,
    shape: &CapsuleShape,
    params: &CollisionParams,
) -> Vec<CollisionHitResult> {
    let capsule = shape.at(start);
    let delta = end - start;
    let bounds = capsule.swept_bounds(delta).expanded(QUERY_MARGIN);

    let mut candidates = Vec::new();
    world.query(&bounds, params.mask, &mut candidates);

    let mut hits = Vec::new();
    let mut results: Vec<CollisionResult> = Vec::new();
    for (id, collidable) in candidates {
        results.clear();
        collidable.test_capsule(&capsule, delta, &mut results);
        hits.extend(
            results
                .iter()
                .filter(|r| r.has_collision)
                .map(|r| CollisionHitResult::from_result(start, end, id, r)),
        );
    }

    hits.sort_by(compare_hits);

    let limit = if params.closest_only { 1 } else { params.max_hits.max(1) };
    hits.truncate(limit);
    hits
}

/// First blocking hit of a sweep, if any.
pub fn sweep_single(
    world: &dyn BroadPhase,
    start: Vec3,
    end: Vec3,
    shape: &CapsuleShape,
    params: &CollisionParams,
) -> Option<CollisionHitResult> {
    let params = CollisionParams {
        closest_only: true,
        max_hits: 1,
        ..*params
    };
    sweep_multi(world, start, end, shape, &params).into_iter().next()
}

/// Every collidable overlapping `shape` placed at `center`.
pub fn overlap_multi(
    world: &dyn BroadPhase,
    center: Vec3,
    shape: &CapsuleShape,
    params: &CollisionParams,
) -> Vec<CollisionHitResult> {
    let mut hits = sweep_multi(world, center, center, shape, params);
    hits.retain(|h| h.start_penetrating);
    hits
}

/// Check whether `shape` at `center` overlaps anything.
pub fn overlap_test(
    world: &dyn BroadPhase,
    center: Vec3,
    shape: &CapsuleShape,
    params: &CollisionParams,
) -> bool {
    !overlap_multi(world, center, shape, params).is_empty()
}

/// Trace a point from `start` to `end`.
pub fn line_trace(
    world: &dyn BroadPhase,
    start: Vec3,
    end: Vec3,
    params: &CollisionParams,
) -> Option<CollisionHitResult> {
    let shape = CapsuleShape::new(LINE_TRACE_RADIUS, LINE_TRACE_RADIUS);
    sweep_single(world, start, end, &shape, params)
}

fn compare_hits(a: &CollisionHitResult, b: &CollisionHitResult) -> Ordering {
    a.time
        .total_cmp(&b.time)
        .then_with(|| b.penetration_depth.total_cmp(&a.penetration_depth))
        .then_with(|| a.collidable.cmp(&b.collidable))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::{CollidableId, CollisionMask, CollisionWorld};

    fn corridor() -> CollisionWorld {
        let mut world = CollisionWorld::new();
        world.add_box(Vec3::new(0.0, -0.5, 0.0), Vec3::new(50.0, 0.5, 50.0), CollisionMask::WORLD_STATIC);
        world.add_box(Vec3::new(5.5, 2.0, 0.0), Vec3::new(0.5, 2.0, 10.0), CollisionMask::WORLD_STATIC);
        world.add_box(Vec3::new(8.5, 2.0, 0.0), Vec3::new(0.5, 2.0, 10.0), CollisionMask::WORLD_STATIC);
        world
    }

    #[test]
    fn test_sweep_multi_orders_by_time() {
        let world = corridor();
        let shape = CapsuleShape::new(0.4, 0.9);
        let hits = sweep_multi(
            &world,
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(12.0, 1.0, 0.0),
            &shape,
            &CollisionParams::multi(CollisionMask::MASK_MOVEMENT),
        );

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].collidable, Some(CollidableId(1)));
        assert!(hits[0].time < hits[1].time);
        // Capsule surface meets the wall face at x=5.
        assert!((hits[0].location.x - 4.6).abs() < 1e-3, "x={}", hits[0].location.x);
        assert!(hits[0].impact_normal.x < -0.99);
    }

    #[test]
    fn test_sweep_single_returns_first() {
        let world = corridor();
        let shape = CapsuleShape::new(0.4, 0.9);
        let hit = sweep_single(
            &world,
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(12.0, 1.0, 0.0),
            &shape,
            &CollisionParams::closest(CollisionMask::MASK_MOVEMENT),
        )
        .unwrap();

        assert_eq!(hit.collidable, Some(CollidableId(1)));
        assert!(hit.is_valid_blocking_hit());
    }

    #[test]
    fn test_overlap_prefers_deeper_penetration() {
        let mut world = CollisionWorld::new();
        world.add_box(Vec3::new(0.0, -0.5, 0.0), Vec3::new(5.0, 0.5, 5.0), CollisionMask::WORLD_STATIC);
        world.add_box(Vec3::new(0.6, 1.0, 0.0), Vec3::new(0.5, 2.0, 5.0), CollisionMask::WORLD_STATIC);

        let shape = CapsuleShape::new(0.4, 0.9);
        let hits = overlap_multi(
            &world,
            Vec3::new(0.0, 0.85, 0.0),
            &shape,
            &CollisionParams::multi(CollisionMask::MASK_MOVEMENT),
        );

        assert_eq!(hits.len(), 2);
        assert!(hits[0].penetration_depth >= hits[1].penetration_depth);
        assert_eq!(hits[0].collidable, Some(CollidableId(1)));
        assert!(overlap_test(
            &world,
            Vec3::new(0.0, 0.85, 0.0),
            &shape,
            &CollisionParams::multi(CollisionMask::MASK_MOVEMENT)
        ));
    }

    #[test]
    fn test_line_trace_hits_floor() {
        let world = corridor();
        let hit = line_trace(
            &world,
            Vec3::new(0.0, 2.0, 0.0),
            Vec3::new(0.0, -2.0, 0.0),
            &CollisionParams::closest(CollisionMask::MASK_FLOOR),
        )
        .unwrap();

        assert!((hit.location.y - LINE_TRACE_RADIUS).abs() < 1e-3);
        assert!(hit.impact_normal.y > 0.99);
    }

    #[test]
    fn test_sweep_in_open_space_misses() {
        let world = corridor();
        let hits = sweep_multi(
            &world,
            Vec3::new(0.0, 3.0, -20.0),
            Vec3::new(0.0, 3.0, -25.0),
            &CapsuleShape::HUMANOID,
            &CollisionParams::default(),
        );
        assert!(hits.is_empty());
    }
}
