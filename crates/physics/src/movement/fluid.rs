//! Swimming and flying.
//!
//! Both modes use fluid friction instead of ground friction, full 3D
//! acceleration, and a step-up attempt when the unit bumps into a low
//! ledge while moving roughly horizontally. Long ticks are split into
//! sub-steps like the other modes.

use glam::Vec3;

use super::config::MIN_TICK_TIME;
use super::controller::{PhysicsOutcome, UnitMovement};
use super::mode::MovementMode;
use super::owner::MoveContext;

/// Walls steeper than this (|normal.y|) are candidates for stepping up.
const STEP_WALL_NORMAL_Y: f32 = 0.2;

impl UnitMovement {
    /// Simulate swimming or flying for `delta_time` seconds.
    pub(crate) fn phys_fluid(
        &mut self,
        ctx: &mut MoveContext<'_>,
        delta_time: f32,
        iterations: &mut u32,
        swimming: bool,
    ) -> PhysicsOutcome {
        if delta_time < MIN_TICK_TIME {
            return PhysicsOutcome::Finished;
        }

        let mode = self.mode;
        let mut remaining = delta_time;

        while remaining >= MIN_TICK_TIME && *iterations < self.config.max_simulation_iterations {
            *iterations += 1;
            let time_tick = self.simulation_time_step(remaining, *iterations);
            remaining -= time_tick;

            self.fluid_step(ctx, time_tick, swimming);

            if self.mode != mode || !matches!(self.mode, MovementMode::Swimming | MovementMode::Flying) {
                return PhysicsOutcome::Continue { remaining };
            }
        }

        self.log_dropped_time(remaining, *iterations);
        PhysicsOutcome::Finished
    }

    /// One fluid sub-step of `time_tick` seconds.
    fn fluid_step(&mut self, ctx: &mut MoveContext<'_>, time_tick: f32, swimming: bool) {
        let friction = 0.5 * self.config.fluid_friction;
        let braking = self.max_braking_deceleration();
        self.calc_velocity(time_tick, friction, true, braking);

        if swimming {
            // Neutral buoyancy cancels gravity.
            self.velocity.y += self.config.gravity_y() * (1.0 - self.config.buoyancy) * time_tick;
        }

        self.just_teleported = false;
        let mut old_location = ctx.location();
        let rotation = ctx.rotation();
        let adjusted = self.velocity * time_tick;
        let mut hit = self.safe_move_node(ctx, adjusted, rotation);

        if hit.time < 1.0 && hit.blocking_hit {
            let up_down = -Vec3::Y.dot(self.velocity.normalize_or_zero());
            let mut stepped_up = false;

            if hit.impact_normal.y.abs() < STEP_WALL_NORMAL_Y && up_down < 0.5 && up_down > -STEP_WALL_NORMAL_Y {
                let step_y = ctx.location().y;
                let wall_delta = adjusted * (1.0 - hit.time);
                stepped_up = self.step_up(ctx, wall_delta, &hit).is_some();
                if stepped_up {
                    old_location.y = ctx.location().y - (step_y - old_location.y);
                    log::trace!("stepped up while {}", self.mode);
                }
            }

            if !stepped_up {
                let normal = hit.normal;
                self.slide_along_surface(ctx, adjusted, 1.0 - hit.time, normal, &mut hit);
            }
        }

        if !self.just_teleported {
            self.velocity = (ctx.location() - old_location) / time_tick;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::{Brush, CollisionMask, CollisionWorld};
    use glam::Quat;
    use crate::movement::config::MovementConfig;
    use crate::movement::owner::UnitBody;

    fn open_water() -> CollisionWorld {
        let mut world = CollisionWorld::new();
        world.add_box(Vec3::new(0.0, -50.0, 0.0), Vec3::new(50.0, 0.5, 50.0), CollisionMask::WORLD_STATIC);
        world
    }

    #[test]
    fn test_neutral_buoyancy_holds_depth() {
        let world = open_water();
        let mut body = UnitBody::new(Vec3::new(0.0, 0.0, 0.0));
        let mut ctx = MoveContext::new(&mut body, &world);
        let mut movement = UnitMovement::new(MovementConfig::default());
        movement.mode = MovementMode::Swimming;

        for _ in 0..30 {
            let mut iterations = 0;
            movement.phys_fluid(&mut ctx, 1.0 / 30.0, &mut iterations, true);
        }

        assert!(ctx.location().y.abs() < 1e-4, "y={}", ctx.location().y);
    }

    #[test]
    fn test_negative_buoyancy_sinks() {
        let world = open_water();
        let mut body = UnitBody::new(Vec3::new(0.0, 0.0, 0.0));
        let mut ctx = MoveContext::new(&mut body, &world);
        let mut config = MovementConfig::default();
        config.buoyancy = 0.5;
        let mut movement = UnitMovement::new(config);
        movement.mode = MovementMode::Swimming;

        for _ in 0..30 {
            let mut iterations = 0;
            movement.phys_fluid(&mut ctx, 1.0 / 30.0, &mut iterations, true);
        }

        assert!(ctx.location().y < -0.1, "y={}", ctx.location().y);
        assert!(movement.velocity.y < 0.0);
    }

    fn flyer() -> UnitMovement {
        let mut movement = UnitMovement::new(MovementConfig::default());
        movement.mode = MovementMode::Flying;
        movement.acceleration = Vec3::Z * movement.config.max_acceleration;
        movement.analog_input_modifier = 1.0;
        movement
    }

    #[test]
    fn test_long_tick_is_substepped() {
        let world = open_water();

        let mut long_body = UnitBody::new(Vec3::ZERO);
        let mut long = flyer();
        let mut iterations = 0;
        {
            let mut ctx = MoveContext::new(&mut long_body, &world);
            long.phys_fluid(&mut ctx, 0.4, &mut iterations, false);
        }
        assert_eq!(iterations, 8);

        let mut short_body = UnitBody::new(Vec3::ZERO);
        let mut short = flyer();
        {
            let mut ctx = MoveContext::new(&mut short_body, &world);
            for _ in 0..8 {
                let mut iterations = 0;
                short.phys_fluid(&mut ctx, 0.05, &mut iterations, false);
            }
        }

        let long_z = long_body.transform.position.z;
        let short_z = short_body.transform.position.z;
        assert!((long_z - short_z).abs() < 1e-3, "long={} short={}", long_z, short_z);
        assert!((long.velocity.z - short.velocity.z).abs() < 1e-2);
    }

    #[test]
    fn test_slide_into_slope_does_not_climb() {
        // A 30 degree slope rising towards +X.
        let rotation = Quat::from_rotation_z(30f32.to_radians());
        let normal = rotation * Vec3::Y;
        let mut world = CollisionWorld::new();
        world.add_brush(
            Brush::oriented_cuboid(-normal * 0.5, rotation, Vec3::new(20.0, 0.5, 20.0)),
            CollisionMask::WORLD_STATIC,
        );

        for swimming in [true, false] {
            let start = Vec3::new(-3.0, 0.0, 0.0);
            let mut body = UnitBody::new(start);
            let mut ctx = MoveContext::new(&mut body, &world);
            let mut movement = UnitMovement::new(MovementConfig::default());
            movement.mode = if swimming { MovementMode::Swimming } else { MovementMode::Flying };
            movement.acceleration = Vec3::X * movement.config.max_acceleration;
            movement.analog_input_modifier = 1.0;

            for _ in 0..90 {
                let mut iterations = 0;
                movement.phys_fluid(&mut ctx, 1.0 / 60.0, &mut iterations, swimming);
                let y = ctx.location().y;
                assert!(y <= start.y + 1e-3, "swimming={} y={}", swimming, y);
            }
            // It did reach the slope.
            assert!(ctx.location().x > -2.0, "x={}", ctx.location().x);
        }
    }

    #[test]
    fn test_flying_accelerates_in_3d() {
        let world = open_water();
        let mut body = UnitBody::new(Vec3::ZERO);
        let mut ctx = MoveContext::new(&mut body, &world);
        let mut movement = UnitMovement::new(MovementConfig::default());
        movement.mode = MovementMode::Flying;
        movement.acceleration = Vec3::new(0.0, 1.0, 1.0).normalize() * movement.config.max_acceleration;
        movement.analog_input_modifier = 1.0;

        for _ in 0..10 {
            let mut iterations = 0;
            movement.phys_fluid(&mut ctx, 1.0 / 30.0, &mut iterations, false);
        }

        assert!(ctx.location().y > 0.1);
        assert!(ctx.location().z > 0.1);
    }
}
