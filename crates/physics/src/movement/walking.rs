//! Ground movement.
//!
//! Walking moves the unit along the floor it stands on, lifting the move
//! onto ramps, stepping over obstacles no taller than `max_step_height`,
//! and deciding between walking off a ledge and refusing to.

use glam::Vec3;

use crate::collision::{sweep_single, CollisionHitResult, CollisionMask, CollisionParams};

use super::config::{KINDA_SMALL_NUMBER, MAX_FLOOR_DIST, MAX_STEP_SIDE_Y, MIN_TICK_TIME};
use super::controller::{PhysicsOutcome, UnitMovement};
use super::floor::{dist_2d_sq, is_within_edge_tolerance, FindFloorResult, StepDownResult};
use super::mode::MovementMode;
use super::owner::MoveContext;

/// Per-axis tolerance below which a sub-step's move is treated as zero.
const ZERO_DELTA_TOLERANCE: f32 = 1.0e-6;

/// Extra lift on a step-up so the forward move clears a step exactly
/// `max_step_height` tall. The landing height check still decides.
const STEP_UP_CLEARANCE: f32 = 1.0e-3;

/// Slack on the landing height check for float noise in the sweeps.
const STEP_HEIGHT_TOLERANCE: f32 = 1.0e-4;

impl UnitMovement {
    /// Simulate walking for `delta_time` seconds.
    pub(crate) fn phys_walking(
        &mut self,
        ctx: &mut MoveContext<'_>,
        delta_time: f32,
        iterations: &mut u32,
    ) -> PhysicsOutcome {
        if delta_time < MIN_TICK_TIME {
            return PhysicsOutcome::Finished;
        }

        self.just_teleported = false;
        let mut checked_fall = false;
        let mut tried_ledge_move = false;
        let mut remaining = delta_time;

        while remaining >= MIN_TICK_TIME && *iterations < self.config.max_simulation_iterations {
            *iterations += 1;
            self.just_teleported = false;
            let time_tick = self.simulation_time_step(remaining, *iterations);
            remaining -= time_tick;

            let old_location = ctx.location();
            let old_floor = self.current_floor;

            self.acceleration.y = 0.0;
            let friction = self.config.ground_friction;
            let braking = self.max_braking_deceleration();
            self.calc_velocity(time_tick, friction, false, braking);

            let move_velocity = self.velocity;
            let delta = move_velocity * time_tick;
            let zero_delta = delta.abs().max_element() <= ZERO_DELTA_TOLERANCE;
            let mut step_down = None;

            if !zero_delta {
                step_down = self.move_along_floor(ctx, move_velocity, time_tick);

                if self.is_falling() {
                    // Refund the part of the sub-step that was not walked.
                    let desired_dist = delta.length();
                    if desired_dist > KINDA_SMALL_NUMBER {
                        let actual_dist = dist_2d_sq(ctx.location(), old_location).sqrt();
                        remaining += time_tick * (1.0 - (actual_dist / desired_dist).min(1.0));
                    }
                    return PhysicsOutcome::Continue { remaining };
                }
                if self.mode != MovementMode::Walking {
                    return PhysicsOutcome::Continue { remaining };
                }
            }

            match step_down {
                Some(result) if result.computed_floor => self.current_floor = result.floor,
                _ => {
                    let location = ctx.location();
                    self.current_floor = self.find_floor(ctx, location, zero_delta, None);
                }
            }

            let check_ledges = !self.config.can_walk_off_ledges;
            if check_ledges && !self.current_floor.is_walkable_floor() {
                let new_delta = if tried_ledge_move {
                    Vec3::ZERO
                } else {
                    self.ledge_move(ctx, old_location, delta)
                };

                if new_delta != Vec3::ZERO {
                    // Retry the sub-step sideways along the ledge.
                    self.revert_move(ctx, old_location, old_floor, false);
                    tried_ledge_move = true;
                    self.velocity = new_delta / time_tick;
                    remaining += time_tick;
                    continue;
                }

                let must_jump = zero_delta || old_floor.hit.collidable.is_none();
                if (must_jump || !checked_fall)
                    && self.check_fall(ctx, delta, old_location, &mut remaining, time_tick, must_jump)
                {
                    return PhysicsOutcome::Continue { remaining };
                }
                checked_fall = true;

                log::trace!("refusing to walk off ledge at {:?}", ctx.location());
                self.revert_move(ctx, old_location, old_floor, true);
                remaining = 0.0;
                break;
            }

            if self.current_floor.is_walkable_floor() {
                self.adjust_floor_height(ctx);
            } else if self.current_floor.hit.start_penetrating && (zero_delta || remaining <= 0.0) {
                // Penetrating the floor at the end of the move: push out upwards.
                let mut hit = self.current_floor.hit;
                hit.trace_end = hit.trace_start + Vec3::Y * MAX_FLOOR_DIST;
                let adjustment = self.penetration_adjustment(&hit);
                let rotation = ctx.rotation();
                self.resolve_penetration(ctx, adjustment, &hit, rotation);
                self.force_next_floor_check = true;
            }

            if !self.current_floor.is_walkable_floor() && !self.current_floor.hit.start_penetrating {
                let must_jump = self.just_teleported || zero_delta || old_floor.hit.collidable.is_none();
                if (must_jump || !checked_fall)
                    && self.check_fall(ctx, delta, old_location, &mut remaining, time_tick, must_jump)
                {
                    return PhysicsOutcome::Continue { remaining };
                }
                checked_fall = true;
            }

            // Standing still: the rest of the tick would repeat this sub-step.
            if zero_delta {
                remaining = 0.0;
            }

            if self.is_moving_on_ground() && !self.just_teleported && time_tick >= MIN_TICK_TIME {
                self.velocity = (ctx.location() - old_location) / time_tick;
                self.maintain_horizontal_ground_velocity();
            }

            if ctx.location() == old_location {
                remaining = 0.0;
                break;
            }
        }

        if self.is_moving_on_ground() {
            self.maintain_horizontal_ground_velocity();
        }
        self.log_dropped_time(remaining, *iterations);
        PhysicsOutcome::Finished
    }

    /// Move along the current floor by `velocity * delta_seconds`.
    ///
    /// Returns the floor found by a successful step-up, if any.
    pub(crate) fn move_along_floor(
        &mut self,
        ctx: &mut MoveContext<'_>,
        velocity: Vec3,
        delta_seconds: f32,
    ) -> Option<StepDownResult> {
        if !self.current_floor.is_walkable_floor() {
            return None;
        }

        let delta = Vec3::new(velocity.x, 0.0, velocity.z) * delta_seconds;
        let rotation = ctx.rotation();
        let floor_hit = self.current_floor.hit;
        let move_delta = self.compute_ground_movement_delta(delta, &floor_hit, self.current_floor.line_trace);
        let mut hit = self.safe_move_node(ctx, move_delta, rotation);
        let mut step_down = None;

        if hit.start_penetrating {
            // The slide may still push us out.
            let normal = hit.normal;
            self.slide_along_surface(ctx, delta, 1.0, normal, &mut hit);
            if hit.start_penetrating {
                self.handle_stuck(ctx, &hit);
            }
        } else if hit.is_valid_blocking_hit() {
            let mut percent_time_applied = hit.time;

            if hit.time > 0.0 && hit.normal.y > KINDA_SMALL_NUMBER && self.is_walkable(&hit) {
                // Hit a ramp: redirect the rest of the move up it.
                let initial_percent_remaining = 1.0 - percent_time_applied;
                let ramp_delta = self.compute_ground_movement_delta(delta * initial_percent_remaining, &hit, false);
                hit = self.safe_move_node(ctx, ramp_delta, rotation);
                let second_hit_percent = hit.time * initial_percent_remaining;
                percent_time_applied = (percent_time_applied + second_hit_percent).clamp(0.0, 1.0);
            }

            if hit.is_valid_blocking_hit() && self.can_step_up(&hit) {
                let pre_step_location = ctx.location();
                match self.step_up(ctx, delta * (1.0 - percent_time_applied), &hit) {
                    Some(result) => {
                        if !self.config.maintain_horizontal_ground_velocity {
                            // Velocity from the stepped displacement, not the snap.
                            self.just_teleported = true;
                            let step_time = (1.0 - percent_time_applied) * delta_seconds;
                            if step_time >= KINDA_SMALL_NUMBER {
                                let stepped = (ctx.location() - pre_step_location) / step_time;
                                self.velocity = Vec3::new(stepped.x, 0.0, stepped.z);
                            }
                        }
                        step_down = Some(result);
                    }
                    None => {
                        let normal = hit.normal;
                        self.slide_along_surface(ctx, delta, 1.0 - percent_time_applied, normal, &mut hit);
                    }
                }
            }
        }

        step_down
    }

    /// Redirect a horizontal move along a walkable ramp.
    ///
    /// With `maintain_horizontal_ground_velocity` the horizontal part is
    /// kept and the vertical part added; otherwise the result keeps the
    /// original length.
    pub(crate) fn compute_ground_movement_delta(
        &self,
        delta: Vec3,
        ramp_hit: &CollisionHitResult,
        hit_from_line_trace: bool,
    ) -> Vec3 {
        let floor_normal = ramp_hit.impact_normal;
        let contact_normal = ramp_hit.normal;

        let on_ramp = floor_normal.y < 1.0 - KINDA_SMALL_NUMBER
            && floor_normal.y > KINDA_SMALL_NUMBER
            && contact_normal.y > KINDA_SMALL_NUMBER
            && !hit_from_line_trace
            && self.is_walkable(ramp_hit);
        if !on_ramp {
            return delta;
        }

        let floor_dot_delta = floor_normal.dot(delta);
        let ramp_delta = Vec3::new(delta.x, -floor_dot_delta / floor_normal.y, delta.z);
        if self.config.maintain_horizontal_ground_velocity {
            ramp_delta
        } else {
            ramp_delta.normalize_or_zero() * delta.length()
        }
    }

    fn can_step_up(&self, hit: &CollisionHitResult) -> bool {
        hit.is_valid_blocking_hit() && self.mode != MovementMode::Falling
    }

    /// Try to climb over the obstacle of `in_hit` while moving by `delta`.
    ///
    /// Moves up by at most `max_step_height`, forward by `delta`, then back
    /// down. Returns `None` (and restores the location) if the landing is
    /// too high, unwalkable or off the capsule's footprint.
    pub(crate) fn step_up(
        &mut self,
        ctx: &mut MoveContext<'_>,
        delta: Vec3,
        in_hit: &CollisionHitResult,
    ) -> Option<StepDownResult> {
        let max_step = self.config.max_step_height;
        if !self.can_step_up(in_hit) || max_step <= 0.0 {
            return None;
        }

        let old_location = ctx.location();
        let rotation = ctx.rotation();
        let radius = ctx.shape.radius;
        let half_height = ctx.shape.half_height;

        // Nothing to step onto if the top of the capsule is what hit.
        let initial_impact_y = in_hit.impact_point.y;
        if initial_impact_y > old_location.y + (half_height - radius) {
            return None;
        }

        let mut step_travel_up = max_step;
        let mut step_travel_down = max_step;
        let step_side_y = in_hit.impact_normal.y;
        let mut initial_floor_base_y = old_location.y - half_height;
        let mut floor_point_y = initial_floor_base_y;

        if self.is_moving_on_ground() && self.current_floor.is_walkable_floor() {
            // Measure the step from the floor under the capsule as it is now.
            // The cached floor was found before this sub-step's move.
            let reach = max_step + MAX_FLOOR_DIST;
            let live_floor = self.compute_floor_dist(ctx, old_location, reach, reach, radius, None);
            let floor = if live_floor.is_walkable_floor() {
                live_floor
            } else {
                self.current_floor
            };

            let floor_dist = floor.distance_to_floor().max(0.0);
            initial_floor_base_y -= floor_dist;
            step_travel_up = (step_travel_up - floor_dist).max(0.0);
            step_travel_down = max_step + MAX_FLOOR_DIST * 2.0;

            let hit_vertical_face = !is_within_edge_tolerance(in_hit.location, in_hit.impact_point, radius);
            if !floor.line_trace && !hit_vertical_face {
                floor_point_y = floor.hit.impact_point.y;
            } else {
                floor_point_y -= floor.floor_dist;
            }
        }
        step_travel_up += STEP_UP_CLEARANCE;
        step_travel_down += STEP_UP_CLEARANCE;

        if initial_impact_y <= initial_floor_base_y {
            return None;
        }

        let abort = |ctx: &mut MoveContext<'_>, reason: &str| -> Option<StepDownResult> {
            log::debug!("step up rejected: {reason}");
            ctx.set_location_and_rotation(old_location, rotation);
            None
        };

        let (_, sweep_up) = self.move_node(ctx, Vec3::Y * step_travel_up, rotation);
        if sweep_up.start_penetrating {
            return abort(ctx, "penetrating on the way up");
        }

        let (_, mut hit) = self.move_node(ctx, delta, rotation);
        if hit.blocking_hit {
            if hit.start_penetrating {
                return abort(ctx, "penetrating on the way forward");
            }

            let forward_hit_time = hit.time;
            let normal = hit.normal;
            let forward_slide_amount = self.slide_along_surface(ctx, delta, 1.0 - hit.time, normal, &mut hit);

            if self.is_falling() {
                return abort(ctx, "started falling");
            }
            if forward_hit_time == 0.0 && forward_slide_amount == 0.0 {
                return abort(ctx, "blocked forward");
            }
        }

        let (_, hit) = self.move_node(ctx, -Vec3::Y * step_travel_down, rotation);
        if hit.start_penetrating {
            return abort(ctx, "penetrating on the way down");
        }

        let mut result = StepDownResult::default();
        if hit.is_valid_blocking_hit() {
            let delta_y = hit.impact_point.y - floor_point_y;
            if delta_y > max_step + STEP_HEIGHT_TOLERANCE {
                return abort(ctx, "too high");
            }

            if !self.is_walkable(&hit) {
                // Unwalkable landing facing us, or higher than where we started.
                if delta.dot(hit.impact_normal) < 0.0 {
                    return abort(ctx, "unwalkable surface facing the move");
                }
                if hit.location.y > old_location.y {
                    return abort(ctx, "unwalkable surface above start");
                }
            }

            if !is_within_edge_tolerance(hit.location, hit.impact_point, radius) {
                return abort(ctx, "landing outside capsule footprint");
            }

            let location = ctx.location();
            let floor = self.find_floor(ctx, location, false, Some(&hit));

            // Stepping onto a ledge with no floor under it.
            if hit.location.y > old_location.y && !floor.valid_floor && step_side_y < MAX_STEP_SIDE_Y {
                return abort(ctx, "no floor after step");
            }

            result = StepDownResult {
                computed_floor: true,
                floor,
            };
        }

        self.just_teleported |= !self.config.maintain_horizontal_ground_velocity;
        log::trace!("stepped up {:.3}", ctx.location().y - old_location.y);
        Some(result)
    }

    /// Sideways move along a ledge, or zero if neither side has floor.
    pub(crate) fn ledge_move(&self, ctx: &MoveContext<'_>, old_location: Vec3, delta: Vec3) -> Vec3 {
        if delta.abs().max_element() <= ZERO_DELTA_TOLERANCE {
            return Vec3::ZERO;
        }

        let side_dir = Vec3::new(delta.z, 0.0, -delta.x);
        if self.check_ledge_direction(ctx, old_location, side_dir) {
            return side_dir;
        }
        if self.check_ledge_direction(ctx, old_location, -side_dir) {
            return -side_dir;
        }
        Vec3::ZERO
    }

    /// Check whether moving by `side_step` keeps walkable floor under the unit.
    pub(crate) fn check_ledge_direction(&self, ctx: &MoveContext<'_>, old_location: Vec3, side_step: Vec3) -> bool {
        let params = CollisionParams::closest(CollisionMask::MASK_MOVEMENT);
        let side_dest = old_location + side_step;

        let side_hit = sweep_single(ctx.world, old_location, side_dest, &ctx.shape, &params);
        let result = match side_hit {
            Some(hit) if !self.is_walkable(&hit) => return false,
            Some(hit) => Some(hit),
            None => {
                let down = Vec3::Y * (self.config.max_step_height + self.config.ledge_check_threshold);
                sweep_single(ctx.world, side_dest, side_dest - down, &ctx.shape, &params)
            }
        };

        result.is_some_and(|hit| hit.time < 1.0 && self.is_walkable(&hit))
    }

    /// Undo a sub-step.
    pub(crate) fn revert_move(
        &mut self,
        ctx: &mut MoveContext<'_>,
        old_location: Vec3,
        old_floor: FindFloorResult,
        fail_move: bool,
    ) {
        ctx.set_location(old_location);
        self.just_teleported = false;
        self.current_floor = old_floor;
        if fail_move {
            self.velocity = Vec3::ZERO;
            self.acceleration = Vec3::ZERO;
        }
    }

    /// Start falling when walking off the floor is allowed (or forced).
    pub(crate) fn check_fall(
        &mut self,
        ctx: &mut MoveContext<'_>,
        delta: Vec3,
        old_location: Vec3,
        remaining: &mut f32,
        time_tick: f32,
        must_jump: bool,
    ) -> bool {
        if !(must_jump || self.config.can_walk_off_ledges) {
            return false;
        }
        if self.is_moving_on_ground() {
            self.start_falling(ctx, delta, old_location, remaining, time_tick);
        }
        true
    }

    /// Switch to falling, refunding the unwalked part of the sub-step.
    pub(crate) fn start_falling(
        &mut self,
        ctx: &mut MoveContext<'_>,
        delta: Vec3,
        old_location: Vec3,
        remaining: &mut f32,
        time_tick: f32,
    ) {
        let desired_dist = delta.length();
        let actual_dist = dist_2d_sq(ctx.location(), old_location).sqrt();
        // A unit that was standing still falls for the whole sub-step.
        let walked = if desired_dist < KINDA_SMALL_NUMBER {
            0.0
        } else {
            (actual_dist / desired_dist).min(1.0)
        };
        *remaining += time_tick * (1.0 - walked);

        if self.is_moving_on_ground() {
            self.set_mode(ctx, MovementMode::Falling);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::{CollidableId, CollisionResult, CollisionWorld};
    use crate::movement::config::MovementConfig;
    use crate::movement::owner::UnitBody;

    fn ramp_hit(normal: Vec3) -> CollisionHitResult {
        CollisionHitResult::from_result(
            Vec3::ZERO,
            -Vec3::Y,
            CollidableId(0),
            &CollisionResult {
                has_collision: true,
                time: 0.5,
                distance: 0.5,
                normal,
                impact_normal: normal,
                impact_point: -Vec3::Y,
                start_penetrating: false,
                penetration_depth: 0.0,
            },
        )
    }

    #[test]
    fn test_ground_delta_follows_ramp() {
        let movement = UnitMovement::new(MovementConfig::default());
        // 30 degree ramp rising towards +X.
        let normal = Vec3::new(-0.5, 3.0f32.sqrt() * 0.5, 0.0);
        let delta = Vec3::new(1.0, 0.0, 0.0);

        let ramp = movement.compute_ground_movement_delta(delta, &ramp_hit(normal), false);

        assert_eq!(ramp.x, 1.0);
        assert!((ramp.y - 30.0f32.to_radians().tan()).abs() < 1e-5, "ramp={:?}", ramp);
        assert!(ramp.dot(normal).abs() < 1e-5);
    }

    #[test]
    fn test_ground_delta_keeps_length_without_horizontal_maintenance() {
        let mut config = MovementConfig::default();
        config.maintain_horizontal_ground_velocity = false;
        let movement = UnitMovement::new(config);
        let normal = Vec3::new(-0.5, 3.0f32.sqrt() * 0.5, 0.0);

        let ramp = movement.compute_ground_movement_delta(Vec3::X, &ramp_hit(normal), false);
        assert!((ramp.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_flat_floor_and_line_traces_are_not_ramps() {
        let movement = UnitMovement::new(MovementConfig::default());
        let delta = Vec3::new(1.0, 0.0, 1.0);

        assert_eq!(movement.compute_ground_movement_delta(delta, &ramp_hit(Vec3::Y), false), delta);
        let normal = Vec3::new(-0.5, 3.0f32.sqrt() * 0.5, 0.0);
        assert_eq!(movement.compute_ground_movement_delta(delta, &ramp_hit(normal), true), delta);
    }

    #[test]
    fn test_ledge_direction_needs_floor() {
        let mut world = CollisionWorld::new();
        // Floor only for z < 0.
        world.add_box(Vec3::new(0.0, -0.5, -5.0), Vec3::new(5.0, 0.5, 5.0), CollisionMask::WORLD_STATIC);
        let mut body = UnitBody::new(Vec3::new(0.0, 0.922, -0.2));
        let ctx = MoveContext::new(&mut body, &world);
        let movement = UnitMovement::new(MovementConfig::default());

        assert!(movement.check_ledge_direction(&ctx, Vec3::new(0.0, 0.922, -0.2), Vec3::new(0.5, 0.0, 0.0)));
        assert!(!movement.check_ledge_direction(&ctx, Vec3::new(0.0, 0.922, -0.2), Vec3::new(0.0, 0.0, 2.0)));
    }

    #[test]
    fn test_step_up_rejects_top_of_capsule_hit() {
        let world = CollisionWorld::new();
        let mut body = UnitBody::new(Vec3::new(0.0, 1.0, 0.0));
        let mut ctx = MoveContext::new(&mut body, &world);
        let mut movement = UnitMovement::new(MovementConfig::default());

        let mut hit = ramp_hit(-Vec3::X);
        hit.impact_point = Vec3::new(0.35, 1.7, 0.0);

        assert!(movement.step_up(&mut ctx, Vec3::X * 0.1, &hit).is_none());
        assert_eq!(ctx.location(), Vec3::new(0.0, 1.0, 0.0));
    }
}
