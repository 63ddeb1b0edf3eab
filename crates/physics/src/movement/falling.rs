//! Airborne movement.
//!
//! Falling integrates gravity with the trapezoid rule, splits the sub-step
//! at the jump apex, limits air control against walls, and lands the unit
//! on the first valid landing spot.

use glam::Vec3;

use crate::collision::CollisionHitResult;

use super::config::{KINDA_SMALL_NUMBER, MIN_TICK_TIME, VERTICAL_SLOPE_NORMAL_Y};
use super::controller::{PhysicsOutcome, UnitMovement};
use super::mode::{MovementEvent, MovementMode};
use super::owner::MoveContext;
use super::slide_move::{plane_project, safe_normal_2d};

/// Length of the sideways nudge that frees a unit wedged between two slopes.
const WEDGE_SIDE_STEP: f32 = 0.01;

impl UnitMovement {
    /// Simulate falling for `delta_time` seconds.
    pub(crate) fn phys_falling(
        &mut self,
        ctx: &mut MoveContext<'_>,
        delta_time: f32,
        iterations: &mut u32,
    ) -> PhysicsOutcome {
        if delta_time < MIN_TICK_TIME {
            return PhysicsOutcome::Finished;
        }

        let fall_acceleration = self.falling_lateral_acceleration();
        let has_limited_air_control = fall_acceleration.length_squared() > 0.0;
        let mut remaining = delta_time;

        while remaining >= MIN_TICK_TIME && *iterations < self.config.max_simulation_iterations {
            *iterations += 1;
            let mut time_tick = self.simulation_time_step(remaining, *iterations);
            remaining -= time_tick;

            let rotation = ctx.rotation();
            self.just_teleported = false;

            let old_velocity = self.velocity;

            // Lateral velocity, with air control in place of input acceleration.
            {
                let saved_acceleration = self.acceleration;
                self.acceleration = fall_acceleration;
                self.velocity.y = 0.0;
                let friction = self.config.falling_lateral_friction;
                let braking = self.max_braking_deceleration();
                self.calc_velocity(time_tick, friction, false, braking);
                self.velocity.y = old_velocity.y;
                self.acceleration = saved_acceleration;
            }

            let gravity = Vec3::new(0.0, self.config.gravity_y(), 0.0);
            let (gravity_time, ending_jump_force) =
                self.jump.consume_force(time_tick, self.config.apply_gravity_while_jumping);
            if ending_jump_force {
                self.jump.reset(true);
            }

            self.velocity = self.new_fall_velocity(self.velocity, gravity, gravity_time);

            // Split the sub-step at the apex so the top of the arc is not skipped.
            if old_velocity.y > 0.0
                && self.velocity.y <= 0.0
                && self.num_jump_apex_attempts < self.config.max_jump_apex_attempts
            {
                let derived_accel = (self.velocity - old_velocity) / time_tick;
                if derived_accel.y.abs() > f32::EPSILON {
                    let time_to_apex = -old_velocity.y / derived_accel.y;
                    if (KINDA_SMALL_NUMBER..time_tick).contains(&time_to_apex) {
                        let mut apex_velocity = old_velocity + derived_accel * time_to_apex;
                        apex_velocity.y = 0.0;
                        self.velocity = apex_velocity;

                        remaining += time_tick - time_to_apex;
                        time_tick = time_to_apex;
                        *iterations = iterations.saturating_sub(1);
                        self.num_jump_apex_attempts += 1;
                        log::trace!("split falling step at apex after {time_to_apex:.4}s");
                    }
                }
            }

            let mut adjusted = 0.5 * (old_velocity + self.velocity) * time_tick;
            if ending_jump_force && !self.config.apply_gravity_while_jumping {
                // Constant velocity until the jump force ran out, trapezoid after.
                let non_gravity_time = (time_tick - gravity_time).max(0.0);
                adjusted = old_velocity * non_gravity_time + 0.5 * (old_velocity + self.velocity) * gravity_time;
            }

            let mut hit = self.safe_move_node(ctx, adjusted, rotation);
            let mut last_move_time_slice = time_tick;
            let mut sub_time_remaining = time_tick * (1.0 - hit.time);

            if hit.blocking_hit {
                if self.is_valid_landing_spot(ctx, ctx.location(), &hit) {
                    remaining += sub_time_remaining;
                    return self.process_landed(ctx, &hit, remaining);
                }

                // Walkable ground on top of an edge we caught with the rim.
                if !hit.start_penetrating && self.should_check_for_valid_landing_spot(ctx, &hit) {
                    let location = ctx.location();
                    let floor = self.find_floor(ctx, location, false, None);
                    if floor.is_walkable_floor() && self.is_valid_landing_spot(ctx, location, &floor.hit) {
                        remaining += sub_time_remaining;
                        return self.process_landed(ctx, &floor.hit, remaining);
                    }
                }

                adjusted = self.velocity * time_tick;

                let mut velocity_no_air_control = self.velocity;
                let mut air_control_accel = self.acceleration;
                if has_limited_air_control {
                    velocity_no_air_control = self.velocity_without_air_control(old_velocity, gravity, gravity_time, time_tick);
                    air_control_accel = (self.velocity - velocity_no_air_control) / time_tick;
                    let air_control_delta = self.limit_air_control(air_control_accel, &hit) * time_tick;
                    adjusted = (velocity_no_air_control + air_control_delta) * time_tick;
                }

                let old_hit_normal = hit.normal;
                let old_hit_impact_normal = hit.impact_normal;
                let mut delta = self.compute_slide_vector(adjusted, 1.0 - hit.time, old_hit_normal, &hit);

                if sub_time_remaining > KINDA_SMALL_NUMBER && !self.just_teleported {
                    self.velocity = delta / sub_time_remaining;
                }

                if sub_time_remaining > KINDA_SMALL_NUMBER && delta.dot(adjusted) > 0.0 {
                    hit = self.safe_move_node(ctx, delta, rotation);

                    if hit.blocking_hit {
                        last_move_time_slice = sub_time_remaining;
                        sub_time_remaining *= 1.0 - hit.time;

                        if self.is_valid_landing_spot(ctx, ctx.location(), &hit) {
                            remaining += sub_time_remaining;
                            return self.process_landed(ctx, &hit, remaining);
                        }

                        // Air control must not push the unit up a wall it is
                        // sliding down.
                        if has_limited_air_control && hit.normal.y > VERTICAL_SLOPE_NORMAL_Y {
                            let last_move_no_air_control = velocity_no_air_control * last_move_time_slice;
                            delta = self.compute_slide_vector(last_move_no_air_control, 1.0, old_hit_normal, &hit);
                        }

                        self.two_wall_adjust(&mut delta, &hit, old_hit_normal);

                        if has_limited_air_control {
                            let air_control_delta_v =
                                self.limit_air_control(air_control_accel, &hit) * last_move_time_slice;
                            // Only keep air control that points away from the first wall.
                            if air_control_delta_v.dot(old_hit_normal) > 0.0 {
                                delta += air_control_delta_v * sub_time_remaining;
                            }
                        }

                        if sub_time_remaining > KINDA_SMALL_NUMBER && !self.just_teleported {
                            self.velocity = delta / sub_time_remaining;
                        }

                        // Falling into a ditch: two opposed slopes stopping the slide.
                        let ditch = old_hit_impact_normal.y > 0.0
                            && hit.impact_normal.y > 0.0
                            && delta.y.abs() <= KINDA_SMALL_NUMBER
                            && hit.impact_normal.dot(old_hit_impact_normal) < 0.0;

                        hit = self.safe_move_node(ctx, delta, rotation);
                        if hit.time == 0.0 {
                            // Stuck between surfaces: nudge sideways.
                            let mut side_delta = safe_normal_2d(old_hit_normal + hit.impact_normal);
                            if side_delta == Vec3::ZERO {
                                side_delta = Vec3::new(old_hit_normal.z, 0.0, -old_hit_normal.x).normalize_or_zero();
                            }
                            hit = self.safe_move_node(ctx, side_delta * WEDGE_SIDE_STEP, rotation);
                        }

                        if ditch || self.is_valid_landing_spot(ctx, ctx.location(), &hit) || self.can_land_wedged(&hit) {
                            remaining = 0.0;
                            return self.process_landed(ctx, &hit, remaining);
                        }
                        if hit.time == 0.0 && !hit.start_penetrating {
                            // Wedged against surfaces too steep to stand on.
                            log::trace!("wedged on unwalkable surfaces at {:?}", ctx.location());
                            self.velocity = Vec3::ZERO;
                        }
                    }
                }

                if hit.start_penetrating {
                    self.handle_stuck(ctx, &hit);
                }
            }

            self.snap_tiny_lateral_velocity();

            if self.mode != MovementMode::Falling {
                return PhysicsOutcome::Continue { remaining };
            }
        }

        self.log_dropped_time(remaining, *iterations);
        PhysicsOutcome::Finished
    }

    /// The velocity this sub-step would have had without air control.
    fn velocity_without_air_control(&mut self, old_velocity: Vec3, gravity: Vec3, gravity_time: f32, time_tick: f32) -> Vec3 {
        let saved_velocity = self.velocity;
        let saved_acceleration = self.acceleration;

        self.acceleration = Vec3::ZERO;
        self.velocity = Vec3::new(old_velocity.x, 0.0, old_velocity.z);
        let friction = self.config.falling_lateral_friction;
        let braking = self.max_braking_deceleration();
        self.calc_velocity(time_tick, friction, false, braking);
        self.velocity.y = old_velocity.y;
        let result = self.new_fall_velocity(self.velocity, gravity, gravity_time);

        self.velocity = saved_velocity;
        self.acceleration = saved_acceleration;
        result
    }

    /// Remove air control acceleration that pushes into a walkable-ish surface.
    pub(crate) fn limit_air_control(&self, fall_acceleration: Vec3, hit: &CollisionHitResult) -> Vec3 {
        let mut result = fall_acceleration;

        if hit.is_valid_blocking_hit() && hit.normal.y > VERTICAL_SLOPE_NORMAL_Y {
            if result.dot(hit.normal) < 0.0 {
                let normal_2d = safe_normal_2d(hit.normal);
                result = plane_project(result, normal_2d);
            }
        } else if hit.start_penetrating {
            // Allow moving out of penetration only.
            if result.dot(hit.normal) <= 0.0 {
                result = Vec3::ZERO;
            }
        }

        result
    }

    /// A slide blocked at its very start only lands on something walkable.
    pub(crate) fn can_land_wedged(&self, hit: &CollisionHitResult) -> bool {
        hit.time == 0.0 && self.is_walkable(hit)
    }

    /// Land on `hit` and switch to walking.
    pub(crate) fn process_landed(
        &mut self,
        ctx: &mut MoveContext<'_>,
        hit: &CollisionHitResult,
        remaining: f32,
    ) -> PhysicsOutcome {
        let impact_velocity = self.velocity;
        ctx.owner.on_landed(hit);

        if self.is_falling() {
            self.set_mode(ctx, MovementMode::Walking);
        }

        let location = ctx.location();
        log::debug!("landed at {location:?} with velocity {impact_velocity:?}");
        ctx.emit(MovementEvent::Landed {
            location,
            impact_velocity,
        });

        PhysicsOutcome::Continue { remaining }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::{CollidableId, CollisionResult};
    use crate::movement::config::MovementConfig;

    fn hit(normal: Vec3, start_penetrating: bool) -> CollisionHitResult {
        hit_at(0.5, normal, start_penetrating)
    }

    fn hit_at(time: f32, normal: Vec3, start_penetrating: bool) -> CollisionHitResult {
        CollisionHitResult::from_result(
            Vec3::ZERO,
            Vec3::X,
            CollidableId(0),
            &CollisionResult {
                has_collision: true,
                time,
                distance: 0.5,
                normal,
                impact_normal: normal,
                impact_point: Vec3::X,
                start_penetrating,
                penetration_depth: 0.01,
            },
        )
    }

    #[test]
    fn test_air_control_cannot_push_into_slope() {
        let movement = UnitMovement::new(MovementConfig::default());
        let normal = Vec3::new(-1.0, 0.2, 0.0).normalize();

        let limited = movement.limit_air_control(Vec3::new(5.0, 0.0, 1.0), &hit(normal, false));

        assert!(limited.x.abs() < 1e-5, "limited={:?}", limited);
        assert!((limited.z - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_air_control_away_from_slope_kept() {
        let movement = UnitMovement::new(MovementConfig::default());
        let normal = Vec3::new(-1.0, 0.2, 0.0).normalize();
        let accel = Vec3::new(-5.0, 0.0, 0.0);

        assert_eq!(movement.limit_air_control(accel, &hit(normal, false)), accel);
    }

    #[test]
    fn test_air_control_while_penetrating() {
        let movement = UnitMovement::new(MovementConfig::default());

        let out = movement.limit_air_control(Vec3::new(-1.0, 0.0, 0.0), &hit(-Vec3::X, true));
        assert_eq!(out, Vec3::new(-1.0, 0.0, 0.0));

        let into = movement.limit_air_control(Vec3::new(1.0, 0.0, 0.0), &hit(-Vec3::X, true));
        assert_eq!(into, Vec3::ZERO);
    }

    #[test]
    fn test_wedged_slide_lands_only_on_walkable() {
        let movement = UnitMovement::new(MovementConfig::default());
        let steep = Vec3::new(-1.0, 0.3, 0.0).normalize();

        assert!(!movement.can_land_wedged(&hit_at(0.0, steep, false)));
        assert!(movement.can_land_wedged(&hit_at(0.0, Vec3::Y, false)));
        // Not wedged at all.
        assert!(!movement.can_land_wedged(&hit_at(0.5, Vec3::Y, false)));
    }
}
