//! Floor classifier.
//!
//! Answers "is there something walkable under this capsule, and how far
//! down is it?" for walking, landing and step-up checks.
//!
//! # Algorithm
//!
//! 1. Sweep a slightly shortened capsule straight down. Hits against the
//!    side of the capsule (or hits that start overlapping) are retried with
//!    a thinner, shorter capsule so walls next to the unit don't count.
//! 2. If the sweep found something that isn't walkable, fall back to a
//!    line trace from the capsule centre.
//! 3. If the unit overhangs a ledge by more than the perch threshold, probe
//!    again with a reduced radius to decide if it can stand there.
//!
//! Floor distances are measured from the capsule's lowest point. They may
//! be slightly negative, which lets the unit pull itself out of the floor.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::collision::{
    line_trace, sweep_single, CapsuleShape, CollisionHitResult, CollisionMask, CollisionParams, LINE_TRACE_RADIUS,
};

use super::config::{KINDA_SMALL_NUMBER, MAX_FLOOR_DIST, MIN_FLOOR_DIST, SWEEP_EDGE_REJECT_DISTANCE};
use super::controller::UnitMovement;
use super::mode::MovementMode;
use super::owner::MoveContext;

/// Rest distance the unit aims for above its floor.
pub const AVG_FLOOR_DIST: f32 = (MIN_FLOOR_DIST + MAX_FLOOR_DIST) * 0.5;

/// Smallest radius the perch probe is allowed to use.
const MIN_PERCH_RADIUS: f32 = 0.0011;

/// Outcome of one floor check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FindFloorResult {
    /// Something was hit below the capsule.
    pub valid_floor: bool,
    /// The hit is a floor the unit can stand on. Implies `valid_floor`.
    pub walkable_floor: bool,
    /// The result came from the line trace fallback.
    pub line_trace: bool,
    /// Distance from the capsule bottom to the swept floor.
    pub floor_dist: f32,
    /// Distance from the capsule bottom to the line-traced floor.
    pub line_dist: f32,
    /// The hit the result was built from.
    pub hit: CollisionHitResult,
}

impl Default for FindFloorResult {
    fn default() -> Self {
        Self {
            valid_floor: false,
            walkable_floor: false,
            line_trace: false,
            floor_dist: 0.0,
            line_dist: 0.0,
            hit: CollisionHitResult::no_hit(Vec3::ZERO, Vec3::ZERO),
        }
    }
}

impl FindFloorResult {
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Standing on something walkable.
    #[inline]
    pub fn is_walkable_floor(&self) -> bool {
        self.valid_floor && self.walkable_floor
    }

    /// The distance that applies to this result: line distance for line
    /// traces, sweep distance otherwise.
    #[inline]
    pub fn distance_to_floor(&self) -> f32 {
        if self.line_trace {
            self.line_dist
        } else {
            self.floor_dist
        }
    }

    pub fn set_from_sweep(&mut self, hit: CollisionHitResult, sweep_floor_dist: f32, walkable: bool) {
        self.valid_floor = hit.is_valid_blocking_hit();
        self.walkable_floor = self.valid_floor && walkable;
        self.line_trace = false;
        self.floor_dist = sweep_floor_dist;
        self.line_dist = 0.0;
        self.hit = hit;
    }

    /// Adopt a line trace hit while keeping the sweep's trace metadata.
    pub fn set_from_line_trace(&mut self, hit: CollisionHitResult, sweep_floor_dist: f32, line_dist: f32, walkable: bool) {
        if self.hit.blocking_hit && hit.blocking_hit {
            let mut merged = hit;
            merged.merge_line_metadata(&self.hit);
            self.hit = merged;
            self.line_trace = true;
            self.floor_dist = sweep_floor_dist;
            self.line_dist = line_dist;
            self.walkable_floor = self.valid_floor && walkable;
        }
    }
}

/// Result of the downward part of a step-up, reused as the next floor.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepDownResult {
    pub computed_floor: bool,
    pub floor: FindFloorResult,
}

/// Check whether `impact_point` lies inside the capsule footprint, away
/// from the rim where side hits land.
pub fn is_within_edge_tolerance(capsule_location: Vec3, impact_point: Vec3, radius: f32) -> bool {
    let offset = impact_point - capsule_location;
    let dist_sq = offset.x * offset.x + offset.z * offset.z;
    let reduced = (SWEEP_EDGE_REJECT_DISTANCE + KINDA_SMALL_NUMBER).max(radius - SWEEP_EDGE_REJECT_DISTANCE);
    dist_sq < reduced * reduced
}

/// Squared horizontal distance between two points.
#[inline]
pub(crate) fn dist_2d_sq(a: Vec3, b: Vec3) -> f32 {
    let d = a - b;
    d.x * d.x + d.z * d.z
}

impl UnitMovement {
    /// Check whether `hit` is a surface the unit can stand on.
    pub fn is_walkable(&self, hit: &CollisionHitResult) -> bool {
        if !hit.is_valid_blocking_hit() {
            return false;
        }
        // Never walk up vertical or overhanging surfaces.
        if hit.impact_normal.y < KINDA_SMALL_NUMBER {
            return false;
        }
        hit.impact_normal.y >= self.config.walkable_floor_y()
    }

    /// Find the floor under a capsule centred at `location`.
    ///
    /// A previous downward sweep from the same location may be passed in to
    /// skip a redundant sweep.
    pub(crate) fn find_floor(
        &mut self,
        ctx: &MoveContext<'_>,
        location: Vec3,
        can_use_cached: bool,
        downward_hit: Option<&CollisionHitResult>,
    ) -> FindFloorResult {
        let height_check_adjust = if self.is_moving_on_ground() {
            MAX_FLOOR_DIST + KINDA_SMALL_NUMBER
        } else {
            -MAX_FLOOR_DIST
        };
        let sweep_dist = MAX_FLOOR_DIST.max(self.config.max_step_height + height_check_adjust);
        let line_dist = sweep_dist;

        let use_cache =
            can_use_cached && !self.config.always_check_floor && !self.force_next_floor_check && !self.just_teleported;
        if use_cache {
            return self.current_floor;
        }
        self.force_next_floor_check = false;

        let mut result =
            self.compute_floor_dist(ctx, location, line_dist, sweep_dist, ctx.shape.radius, downward_hit);

        if result.valid_floor && !result.line_trace && self.should_compute_perch_result(ctx, &result.hit, true) {
            let mut max_perch_floor_dist = MAX_FLOOR_DIST.max(self.config.max_step_height + height_check_adjust);
            if self.is_moving_on_ground() {
                max_perch_floor_dist += self.config.perch_additional_height.max(0.0);
            }

            match self.compute_perch_result(ctx, self.valid_perch_radius(ctx), &result.hit, max_perch_floor_dist) {
                Some(perch) => {
                    // Don't let the height adjustment lift us past the perch distance.
                    let move_up_dist = AVG_FLOOR_DIST - result.floor_dist;
                    if move_up_dist + perch.floor_dist >= max_perch_floor_dist {
                        result.floor_dist = AVG_FLOOR_DIST;
                    }
                    if !result.walkable_floor {
                        let floor_dist = result.floor_dist;
                        result.set_from_line_trace(perch.hit, floor_dist, floor_dist.max(MIN_FLOOR_DIST), true);
                    }
                }
                None => {
                    // Overhanging with nothing to perch on.
                    result.walkable_floor = false;
                }
            }
        }

        result
    }

    /// Sweep and line-trace for the floor distance under `location`.
    pub(crate) fn compute_floor_dist(
        &self,
        ctx: &MoveContext<'_>,
        location: Vec3,
        line_dist: f32,
        sweep_dist: f32,
        sweep_radius: f32,
        downward_hit: Option<&CollisionHitResult>,
    ) -> FindFloorResult {
        let mut result = FindFloorResult::default();
        let radius = ctx.shape.radius;
        let half_height = ctx.shape.half_height;
        let params = CollisionParams::closest(CollisionMask::MASK_FLOOR);

        let mut skip_sweep = false;
        if let Some(prior) = downward_hit.filter(|h| h.is_valid_blocking_hit()) {
            let vertical = prior.trace_start.y > prior.trace_end.y
                && dist_2d_sq(prior.trace_start, prior.trace_end) <= KINDA_SMALL_NUMBER;
            if vertical && is_within_edge_tolerance(prior.location, prior.impact_point, radius) {
                skip_sweep = true;
                let walkable = self.is_walkable(prior);
                result.set_from_sweep(*prior, location.y - prior.location.y, walkable);
                if walkable {
                    return result;
                }
            }
        }

        if sweep_dist < line_dist {
            return result;
        }

        if !skip_sweep && sweep_dist > 0.0 && sweep_radius > 0.0 {
            // A shorter capsule avoids starting inside the surface we stand on.
            let mut shrink_height = (half_height - radius) * 0.1;
            let mut trace_dist = sweep_dist + shrink_height;
            let mut shape = CapsuleShape::new(sweep_radius, half_height - shrink_height);
            let end = |dist: f32| location - Vec3::Y * dist;

            let mut hit = sweep_single(ctx.world, location, end(trace_dist), &shape, &params);

            if let Some(first) = hit {
                if first.start_penetrating || !is_within_edge_tolerance(location, first.impact_point, shape.radius) {
                    // Retry with a thinner, shorter capsule to ignore the adjacent surface.
                    let thin_radius = (shape.radius - SWEEP_EDGE_REJECT_DISTANCE - KINDA_SMALL_NUMBER).max(0.0);
                    let retry = CapsuleShape {
                        radius: thin_radius,
                        half_height: shape.half_height,
                    };
                    if !retry.is_nearly_zero() {
                        shrink_height = (half_height - radius) * 0.9;
                        trace_dist = sweep_dist + shrink_height;
                        shape = CapsuleShape::new(thin_radius, (half_height - shrink_height).max(thin_radius));
                        hit = sweep_single(ctx.world, location, end(trace_dist), &shape, &params);
                    }
                }
            }

            if let Some(hit) = hit {
                // Negative distances are allowed so the unit can pull out of penetration.
                let max_penetration_adjust = MAX_FLOOR_DIST.max(radius);
                let sweep_result = (hit.time * trace_dist - shrink_height).max(-max_penetration_adjust);
                result.set_from_sweep(hit, sweep_result, false);
                if hit.is_valid_blocking_hit() && self.is_walkable(&hit) && sweep_result <= sweep_dist {
                    result.walkable_floor = true;
                    return result;
                }
            }
        }

        // The sweep is longer than the line trace, so a clean miss means no floor.
        if !result.valid_floor && !result.hit.start_penetrating {
            result.floor_dist = sweep_dist;
            return result;
        }

        if line_dist > 0.0 {
            let shrink_height = half_height;
            let trace_dist = line_dist + shrink_height;
            let hit = line_trace(ctx.world, location, location - Vec3::Y * trace_dist, &params);

            if let Some(hit) = hit.filter(|h| h.blocking_hit && h.time > 0.0) {
                let max_penetration_adjust = MAX_FLOOR_DIST.max(radius);
                let line_result = (hit.time * trace_dist + LINE_TRACE_RADIUS - shrink_height).max(-max_penetration_adjust);
                result.valid_floor = true;
                if line_result <= line_dist && self.is_walkable(&hit) {
                    let floor_dist = result.floor_dist;
                    result.set_from_line_trace(hit, floor_dist, line_result, true);
                    return result;
                }
            }
        }

        result.walkable_floor = false;
        result
    }

    /// Radius of the perch probe capsule.
    pub(crate) fn valid_perch_radius(&self, ctx: &MoveContext<'_>) -> f32 {
        let radius = ctx.shape.radius;
        (radius - self.config.perch_radius_threshold()).clamp(MIN_PERCH_RADIUS.min(radius), radius)
    }

    /// Check whether `hit` lands far enough out on the capsule rim that the
    /// unit should probe for a perch.
    pub(crate) fn should_compute_perch_result(
        &self,
        ctx: &MoveContext<'_>,
        hit: &CollisionHitResult,
        check_radius: bool,
    ) -> bool {
        if !hit.is_valid_blocking_hit() {
            return false;
        }
        if self.config.perch_radius_threshold() <= SWEEP_EDGE_REJECT_DISTANCE {
            return false;
        }
        if check_radius {
            let stand_on_edge_radius = self.valid_perch_radius(ctx);
            if dist_2d_sq(hit.impact_point, hit.location) <= stand_on_edge_radius * stand_on_edge_radius {
                return false;
            }
        }
        true
    }

    /// Probe the floor with a reduced radius from the location of `hit`.
    pub(crate) fn compute_perch_result(
        &self,
        ctx: &MoveContext<'_>,
        test_radius: f32,
        hit: &CollisionHitResult,
        max_floor_dist: f32,
    ) -> Option<FindFloorResult> {
        if max_floor_dist <= 0.0 {
            return None;
        }

        let half_height = ctx.shape.half_height;
        let hit_above_base = (hit.impact_point.y - (hit.location.y - half_height)).max(0.0);
        let perch_line_dist = (max_floor_dist - hit_above_base).max(0.0);
        let perch_sweep_dist = max_floor_dist.max(0.0) + ctx.shape.radius;

        let mut perch =
            self.compute_floor_dist(ctx, hit.location, perch_line_dist, perch_sweep_dist, test_radius, None);

        if !perch.is_walkable_floor() {
            return None;
        }
        if hit_above_base + perch.floor_dist > max_floor_dist {
            perch.walkable_floor = false;
            return None;
        }
        Some(perch)
    }

    /// Keep the resting distance to the current floor inside
    /// `[MIN_FLOOR_DIST, MAX_FLOOR_DIST]`.
    pub(crate) fn adjust_floor_height(&mut self, ctx: &mut MoveContext<'_>) {
        if !self.current_floor.is_walkable_floor() {
            return;
        }

        let mut old_floor_dist = self.current_floor.floor_dist;
        if self.current_floor.line_trace {
            if old_floor_dist < MIN_FLOOR_DIST && self.current_floor.line_dist >= MIN_FLOOR_DIST {
                // Would climb an unwalkable wall.
                return;
            }
            old_floor_dist = self.current_floor.line_dist;
        }

        if (MIN_FLOOR_DIST..=MAX_FLOOR_DIST).contains(&old_floor_dist) {
            return;
        }

        let initial_y = ctx.location().y;
        let move_dist = AVG_FLOOR_DIST - old_floor_dist;
        let rotation = ctx.rotation();
        let adjust_hit = self.safe_move_node(ctx, Vec3::Y * move_dist, rotation);

        if !adjust_hit.is_valid_blocking_hit() {
            self.current_floor.floor_dist += move_dist;
        } else if move_dist > 0.0 {
            self.current_floor.floor_dist += ctx.location().y - initial_y;
        } else {
            let current_y = ctx.location().y;
            self.current_floor.floor_dist = current_y - adjust_hit.location.y;
            if self.is_walkable(&adjust_hit) {
                let floor_dist = self.current_floor.floor_dist;
                self.current_floor.set_from_sweep(adjust_hit, floor_dist, true);
            }
        }

        // Large corrections and penetration fixes must not leak into velocity.
        self.just_teleported |= old_floor_dist < 0.0 || move_dist.abs() > self.config.floor_snap_teleport_threshold;
        self.force_next_floor_check = true;

        log::trace!("floor height adjusted by {move_dist:.4} to {:.4}", self.current_floor.floor_dist);
    }

    /// Check whether the unit may land at `location` after `hit`.
    pub(crate) fn is_valid_landing_spot(&mut self, ctx: &MoveContext<'_>, location: Vec3, hit: &CollisionHitResult) -> bool {
        if !hit.blocking_hit {
            return false;
        }

        if !hit.start_penetrating {
            if !self.is_walkable(hit) {
                return false;
            }
            // Contacts above the lower hemisphere come from sliding down a wall.
            let lower_hemisphere_y = hit.location.y - ctx.shape.half_height + ctx.shape.radius;
            if hit.impact_point.y >= lower_hemisphere_y {
                return false;
            }
            if !is_within_edge_tolerance(hit.location, hit.impact_point, ctx.shape.radius) {
                return false;
            }
        } else if hit.normal.y < KINDA_SMALL_NUMBER {
            // Pushed out sideways from a wall or an overhang: not a floor.
            return false;
        }

        self.find_floor(ctx, location, false, Some(hit)).is_walkable_floor()
    }

    /// Edge hits on the lower hemisphere may still have walkable ground on
    /// top of the edge.
    pub(crate) fn should_check_for_valid_landing_spot(&self, ctx: &MoveContext<'_>, hit: &CollisionHitResult) -> bool {
        if hit.normal.y > KINDA_SMALL_NUMBER && !hit.normal.abs_diff_eq(hit.impact_normal, KINDA_SMALL_NUMBER) {
            return is_within_edge_tolerance(ctx.location(), hit.impact_point, ctx.shape.radius);
        }
        false
    }

    /// Re-run the floor check at the current location and, when walking,
    /// snap to the rest height.
    pub(crate) fn refresh_floor(&mut self, ctx: &mut MoveContext<'_>) {
        let location = ctx.location();
        self.current_floor = self.find_floor(ctx, location, false, None);
        if self.mode == MovementMode::Walking {
            self.adjust_floor_height(ctx);
        }
    }
}
