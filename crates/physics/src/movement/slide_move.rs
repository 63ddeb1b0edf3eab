//! Swept moves and collision response.
//!
//! Every position change during simulation goes through [`UnitMovement::move_node`]:
//! the capsule is swept along the delta, stops just short of the first
//! blocking hit, and reports that hit. On top of that:
//!
//! - `safe_move_node` pushes the unit out of geometry it starts inside of,
//!   then retries the move
//! - `slide_along_surface` redirects blocked movement along the surface,
//!   handling a second wall with `two_wall_adjust`
//! - `compute_slide_vector` projects a move onto a surface and, while
//!   falling, refuses to turn the deflection into extra height

use glam::{Quat, Vec3};

use crate::collision::{overlap_test, sweep_multi, CapsuleShape, CollisionHitResult, CollisionMask, CollisionParams};

use super::config::{
    KINDA_SMALL_NUMBER, MIN_FLOOR_DIST, PENETRATION_OVERLAP_INFLATION, PENETRATION_PULLBACK, PULLBACK_DISTANCE,
};
use super::controller::UnitMovement;
use super::mode::MovementMode;
use super::owner::MoveContext;

/// Moves shorter than this are skipped.
const MIN_MOVE_DELTA: f32 = 1.0e-5;

/// Largest distance a sweep backs off from the surface it hit.
const MAX_PULLBACK_DISTANCE: f32 = 0.01;

/// Extra time fraction removed on top of the pullback distance.
const PULLBACK_TIME_EPSILON: f32 = 0.001;

/// Nudge away from a wall the slide ran into twice.
const SAME_WALL_NUDGE: f32 = 0.0001;

/// Floor normals closer to vertical than this are treated as flat.
const FLAT_FLOOR_NORMAL_Y: f32 = 1.0 - 1.0e-5;

/// Project `v` onto the plane with normal `n`.
#[inline]
pub(crate) fn plane_project(v: Vec3, n: Vec3) -> Vec3 {
    v - n * v.dot(n)
}

/// Horizontal part of `v`, normalized.
#[inline]
pub(crate) fn safe_normal_2d(v: Vec3) -> Vec3 {
    Vec3::new(v.x, 0.0, v.z).normalize_or_zero()
}

/// Back a blocking hit off the surface so the next sweep does not start in contact.
fn pull_back_hit(hit: &mut CollisionHitResult, delta: Vec3) {
    let dist = delta.length();
    if dist <= 0.0 {
        return;
    }
    let back_dist = (0.1 * dist).clamp(PULLBACK_DISTANCE, MAX_PULLBACK_DISTANCE);
    hit.time = (hit.time - back_dist / dist - PULLBACK_TIME_EPSILON).clamp(0.0, 1.0);
    hit.location = hit.trace_start + delta * hit.time;
    hit.distance = dist * hit.time;
}

impl UnitMovement {
    /// Sweep the capsule by `delta` and move it to the first blocking hit.
    ///
    /// Overlaps the unit is moving out of are ignored. Returns whether the
    /// unit moved, and the blocking hit (or a miss spanning the move).
    pub(crate) fn move_node(&mut self, ctx: &mut MoveContext<'_>, delta: Vec3, rotation: Quat) -> (bool, CollisionHitResult) {
        let start = ctx.location();
        let end = start + delta;

        if delta.length_squared() < MIN_MOVE_DELTA * MIN_MOVE_DELTA {
            ctx.set_location_and_rotation(start, rotation);
            return (true, CollisionHitResult::no_hit(start, start));
        }

        let dir = delta / delta.length();
        let hits = sweep_multi(ctx.world, start, end, &ctx.shape, &CollisionParams::multi(CollisionMask::MASK_MOVEMENT));
        let blocking = hits
            .into_iter()
            .find(|h| h.blocking_hit && !(h.start_penetrating && h.normal.dot(dir) > 0.0));

        let Some(mut hit) = blocking else {
            ctx.set_location_and_rotation(end, rotation);
            return (true, CollisionHitResult::no_hit(start, end));
        };

        if hit.start_penetrating {
            ctx.set_location_and_rotation(start, rotation);
            return (false, hit);
        }

        pull_back_hit(&mut hit, delta);
        if (hit.location - start).length_squared() <= MIN_MOVE_DELTA * MIN_MOVE_DELTA {
            hit.time = 0.0;
            hit.location = start;
            hit.distance = 0.0;
        }
        ctx.set_location_and_rotation(hit.location, rotation);
        (hit.time > 0.0, hit)
    }

    /// Move by `delta`, resolving a starting overlap and retrying once.
    pub(crate) fn safe_move_node(&mut self, ctx: &mut MoveContext<'_>, delta: Vec3, rotation: Quat) -> CollisionHitResult {
        let (_, mut hit) = self.move_node(ctx, delta, rotation);

        if hit.start_penetrating {
            let adjustment = self.penetration_adjustment(&hit);
            if self.resolve_penetration(ctx, adjustment, &hit, rotation) {
                hit = self.move_node(ctx, delta, rotation).1;
            }
        }
        hit
    }

    /// Displacement that would move the capsule out of a penetrating hit.
    pub(crate) fn penetration_adjustment(&self, hit: &CollisionHitResult) -> Vec3 {
        if !hit.start_penetrating {
            return Vec3::ZERO;
        }
        let depth = if hit.penetration_depth > 0.0 {
            hit.penetration_depth
        } else {
            PENETRATION_PULLBACK
        };
        let adjustment = hit.normal * (depth + PENETRATION_PULLBACK);
        adjustment.clamp_length_max(self.config.max_depenetration)
    }

    /// Try to push the capsule out of geometry.
    ///
    /// Attempts, in order: teleport to the adjusted location if it is
    /// clear; sweep along the adjustment; sweep along the adjustment
    /// combined with a second overlap's; sweep along adjustment plus the
    /// intended move; sweep along the intended move alone.
    pub(crate) fn resolve_penetration(
        &mut self,
        ctx: &mut MoveContext<'_>,
        adjustment: Vec3,
        hit: &CollisionHitResult,
        rotation: Quat,
    ) -> bool {
        if adjustment == Vec3::ZERO {
            return false;
        }

        let target = hit.trace_start + adjustment;
        let inflated = CapsuleShape::new(
            ctx.shape.radius + PENETRATION_OVERLAP_INFLATION,
            ctx.shape.half_height + PENETRATION_OVERLAP_INFLATION,
        );
        let params = CollisionParams::multi(CollisionMask::MASK_MOVEMENT);
        if !overlap_test(ctx.world, target, &inflated, &params) {
            ctx.set_location_and_rotation(target, rotation);
            self.just_teleported = true;
            log::trace!("depenetrated by {adjustment:?}");
            return true;
        }

        let (mut moved, sweep_out_hit) = self.move_node(ctx, adjustment, rotation);

        if !moved && sweep_out_hit.start_penetrating {
            let second = self.penetration_adjustment(&sweep_out_hit);
            let combined = adjustment + second;
            if second != adjustment && combined != Vec3::ZERO {
                moved = self.move_node(ctx, combined, rotation).0;
            }
        }

        if !moved {
            let move_delta = hit.trace_end - hit.trace_start;
            if move_delta != Vec3::ZERO {
                moved = self.move_node(ctx, adjustment + move_delta, rotation).0;
                if !moved && move_delta.dot(adjustment) > 0.0 {
                    moved = self.move_node(ctx, move_delta, rotation).0;
                }
            }
        }

        self.just_teleported |= moved;
        moved
    }

    /// Slide along the surface of `hit` for the remaining `time` fraction
    /// of `delta`. Returns the fraction of `time` actually applied.
    pub(crate) fn slide_along_surface(
        &mut self,
        ctx: &mut MoveContext<'_>,
        delta: Vec3,
        time: f32,
        normal: Vec3,
        hit: &mut CollisionHitResult,
    ) -> f32 {
        if !hit.blocking_hit {
            return 0.0;
        }

        let mut normal = normal;
        if self.is_moving_on_ground() {
            if normal.y > 0.0 {
                // Unwalkable slopes block like walls.
                if !self.is_walkable(hit) {
                    normal = safe_normal_2d(normal);
                }
            } else if normal.y < -KINDA_SMALL_NUMBER {
                // Don't get pushed down into the floor by a ceiling.
                if self.current_floor.floor_dist < MIN_FLOOR_DIST && self.current_floor.valid_floor {
                    let floor_normal = self.current_floor.hit.normal;
                    let floor_opposed = delta.dot(floor_normal) < 0.0 && floor_normal.y < FLAT_FLOOR_NORMAL_Y;
                    if floor_opposed {
                        normal = floor_normal;
                    }
                    normal = safe_normal_2d(normal);
                }
            }
        }

        let old_hit_normal = normal;
        let mut slide_delta = self.compute_slide_vector(delta, time, normal, hit);
        if slide_delta.dot(delta) <= 0.0 {
            return 0.0;
        }

        let rotation = ctx.rotation();
        *hit = self.safe_move_node(ctx, slide_delta, rotation);
        let first_hit_percent = hit.time;
        let mut percent_applied = first_hit_percent;

        if hit.is_valid_blocking_hit() {
            self.two_wall_adjust(&mut slide_delta, hit, old_hit_normal);

            if slide_delta.abs().max_element() > MIN_MOVE_DELTA && slide_delta.dot(delta) > 0.0 {
                *hit = self.safe_move_node(ctx, slide_delta, rotation);
                percent_applied += hit.time * (1.0 - first_hit_percent);
            }
        }

        percent_applied.clamp(0.0, 1.0)
    }

    /// Project `delta * time` onto the surface with `normal`.
    pub(crate) fn compute_slide_vector(&self, delta: Vec3, time: f32, normal: Vec3, _hit: &CollisionHitResult) -> Vec3 {
        let result = plane_project(delta, normal) * time;
        // Off the ground a slide must not climb higher than the move asked.
        if matches!(self.mode, MovementMode::Falling | MovementMode::Swimming | MovementMode::Flying) {
            self.handle_slope_boosting(result, delta, time, normal)
        } else {
            result
        }
    }

    /// Never let a slide move higher than the original move intended.
    ///
    /// Excess upward motion is scaled away and the remainder redirected
    /// horizontally along the surface.
    pub(crate) fn handle_slope_boosting(&self, slide_result: Vec3, delta: Vec3, time: f32, normal: Vec3) -> Vec3 {
        let mut result = slide_result;
        if result.y > 0.0 {
            let y_limit = delta.y * time;
            if result.y - y_limit > KINDA_SMALL_NUMBER {
                if y_limit > 0.0 {
                    // Rescale the whole vector to keep the direction.
                    result *= y_limit / result.y;
                } else {
                    result = Vec3::ZERO;
                }

                let remainder = slide_result - result;
                let remainder_2d = Vec3::new(remainder.x, 0.0, remainder.z);
                result += plane_project(remainder_2d, safe_normal_2d(normal));
            }
        }
        result
    }

    /// Adjust a slide that ran into a second surface.
    ///
    /// Two surfaces forming a corner of 90 degrees or less slide along their
    /// crease. Otherwise the move is re-projected onto the new surface.
    pub(crate) fn two_wall_adjust(&self, delta: &mut Vec3, hit: &CollisionHitResult, old_hit_normal: Vec3) {
        let in_delta = *delta;
        let hit_normal = hit.normal;

        if old_hit_normal.dot(hit_normal) <= 0.0 {
            let desired = *delta;
            let crease = hit_normal.cross(old_hit_normal).normalize_or_zero();
            *delta = crease * delta.dot(crease) * (1.0 - hit.time);
            if desired.dot(*delta) < 0.0 {
                *delta = -*delta;
            }
        } else {
            let desired = *delta;
            *delta = self.compute_slide_vector(*delta, 1.0 - hit.time, hit_normal, hit);
            if delta.dot(desired) <= 0.0 {
                *delta = Vec3::ZERO;
            } else if (hit_normal.dot(old_hit_normal) - 1.0).abs() < KINDA_SMALL_NUMBER {
                // Same wall again after sliding along it: precision, nudge off.
                *delta += hit_normal * SAME_WALL_NUDGE;
            }
        }

        if self.is_moving_on_ground() {
            if delta.y > 0.0 {
                let walkable_slope =
                    (hit.normal.y >= self.config.walkable_floor_y() || self.is_walkable(hit)) && hit.normal.y > KINDA_SMALL_NUMBER;
                if walkable_slope {
                    // Keep horizontal speed while climbing a walkable slope.
                    let time = 1.0 - hit.time;
                    let scaled = delta.normalize_or_zero() * in_delta.length();
                    *delta = Vec3::new(in_delta.x, scaled.y / hit.normal.y, in_delta.z) * time;

                    let max_step = self.config.max_step_height;
                    if delta.y > max_step {
                        *delta *= max_step / delta.y;
                    }
                } else {
                    delta.y = 0.0;
                }
            } else if delta.y < 0.0 && self.current_floor.floor_dist < MIN_FLOOR_DIST && self.current_floor.valid_floor {
                // Don't push down into the floor.
                delta.y = 0.0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::{CollidableId, CollisionResult, CollisionWorld};
    use crate::movement::config::MovementConfig;
    use crate::movement::mode::MovementMode;
    use crate::movement::owner::UnitBody;

    fn room() -> CollisionWorld {
        let mut world = CollisionWorld::new();
        world.add_box(Vec3::new(0.0, -0.5, 0.0), Vec3::new(20.0, 0.5, 20.0), CollisionMask::WORLD_STATIC);
        // Wall facing -X at x=2.
        world.add_box(Vec3::new(2.5, 2.0, 0.0), Vec3::new(0.5, 2.0, 20.0), CollisionMask::WORLD_STATIC);
        world
    }

    fn flying() -> UnitMovement {
        let mut movement = UnitMovement::new(MovementConfig::default());
        movement.mode = MovementMode::Flying;
        movement
    }

    fn wall_hit(normal: Vec3, time: f32) -> CollisionHitResult {
        CollisionHitResult::from_result(
            Vec3::ZERO,
            Vec3::X,
            CollidableId(0),
            &CollisionResult {
                has_collision: true,
                time,
                distance: time,
                normal,
                impact_normal: normal,
                impact_point: Vec3::X,
                start_penetrating: false,
                penetration_depth: 0.0,
            },
        )
    }

    #[test]
    fn test_move_stops_short_of_wall() {
        let world = room();
        let mut body = UnitBody::new(Vec3::new(0.0, 1.5, 0.0));
        let mut ctx = MoveContext::new(&mut body, &world);
        let mut movement = flying();

        let (moved, hit) = movement.move_node(&mut ctx, Vec3::new(3.0, 0.0, 0.0), Quat::IDENTITY);

        assert!(moved);
        assert!(hit.is_valid_blocking_hit());
        let x = ctx.location().x;
        // Capsule surface stops a hair before x=2.
        assert!(x < 1.65 && x > 1.63, "x={}", x);
        assert!(hit.normal.x < -0.99);
    }

    #[test]
    fn test_safe_move_resolves_penetration() {
        let world = room();
        // 5cm into the wall.
        let mut body = UnitBody::new(Vec3::new(1.7, 1.5, 0.0));
        let mut ctx = MoveContext::new(&mut body, &world);
        let mut movement = flying();

        movement.safe_move_node(&mut ctx, Vec3::new(0.0, 0.0, 0.5), Quat::IDENTITY);

        let location = ctx.location();
        assert!(location.x <= 1.65, "x={}", location.x);
        assert!(location.z > 0.4, "z={}", location.z);
        assert!(movement.just_teleported);
    }

    #[test]
    fn test_slide_along_wall() {
        let world = room();
        let mut body = UnitBody::new(Vec3::new(1.0, 1.5, 0.0));
        let mut ctx = MoveContext::new(&mut body, &world);
        let mut movement = flying();

        let delta = Vec3::new(1.0, 0.0, 1.0);
        let mut hit = movement.safe_move_node(&mut ctx, delta, Quat::IDENTITY);
        assert!(hit.is_valid_blocking_hit());

        let normal = hit.normal;
        let remaining = 1.0 - hit.time;
        let applied = movement.slide_along_surface(&mut ctx, delta, remaining, normal, &mut hit);

        assert!(applied > 0.99, "applied={}", applied);
        let location = ctx.location();
        assert!(location.x < 1.65);
        assert!((location.z - 1.0).abs() < 0.02, "z={}", location.z);
    }

    #[test]
    fn test_slope_boosting_never_gains_height() {
        let mut movement = flying();
        movement.mode = MovementMode::Falling;

        // Falling sideways into a 45 degree slope facing -X.
        let normal = Vec3::new(-1.0, 1.0, 0.0).normalize();
        let delta = Vec3::new(1.0, -0.2, 0.0);
        let hit = wall_hit(normal, 0.0);
        let slide = movement.compute_slide_vector(delta, 1.0, normal, &hit);

        assert!(slide.y <= 1e-6, "slide={:?}", slide);
    }

    #[test]
    fn test_two_wall_corner_uses_crease() {
        let movement = flying();
        let first = Vec3::new(-1.0, 0.0, 0.0);
        let second = Vec3::new(0.0, 0.0, -1.0);
        let mut delta = Vec3::new(0.0, 0.0, 1.0);

        movement.two_wall_adjust(&mut delta, &wall_hit(second, 0.0), first);

        // The crease of two vertical walls is vertical; no horizontal motion survives.
        assert!(delta.x.abs() < 1e-6 && delta.z.abs() < 1e-6, "delta={:?}", delta);
    }

    #[test]
    fn test_two_wall_same_wall_nudges_off() {
        let movement = flying();
        let normal = Vec3::new(-1.0, 0.0, 0.0);
        let mut delta = Vec3::new(0.5, 0.0, 1.0);

        movement.two_wall_adjust(&mut delta, &wall_hit(normal, 0.0), normal);

        assert!((delta.z - 1.0).abs() < 1e-5);
        assert!(delta.x < 0.0, "nudged away from the wall: {:?}", delta);
    }

    #[test]
    fn test_penetration_adjustment_clamped() {
        let mut movement = flying();
        movement.config.max_depenetration = 0.1;
        let mut hit = wall_hit(Vec3::Y, 0.0);
        hit.start_penetrating = true;
        hit.penetration_depth = 0.5;

        let adjustment = movement.penetration_adjustment(&hit);
        assert!((adjustment.length() - 0.1).abs() < 1e-5);
        assert!(adjustment.y > 0.0);
    }
}
