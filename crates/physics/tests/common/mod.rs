//! Shared fixtures for the movement scenario tests.

#![allow(dead_code)]

use glam::{Quat, Vec3};
use stride_physics::movement::AVG_FLOOR_DIST;
use stride_physics::{BasicUnit, Brush, CapsuleShape, CollisionMask, CollisionWorld, MovementConfig, MovementMode};

pub const DT: f32 = 1.0 / 60.0;

/// Capsule centre height of a humanoid resting on a floor at y = 0.
pub const REST_Y: f32 = CapsuleShape::HUMANOID.half_height + AVG_FLOOR_DIST;

/// A large flat floor with its top at y = 0.
pub fn flat_world() -> CollisionWorld {
    let mut world = CollisionWorld::new();
    world.add_box(Vec3::new(0.0, -0.5, 0.0), Vec3::new(50.0, 0.5, 50.0), CollisionMask::WORLD_STATIC);
    world
}

/// Add a box whose near face sits at `x = near_x`, spanning the floor to `height`.
pub fn add_obstacle(world: &mut CollisionWorld, near_x: f32, height: f32) {
    world.add_box(
        Vec3::new(near_x + 10.0, height * 0.5, 0.0),
        Vec3::new(10.0, height * 0.5, 10.0),
        CollisionMask::WORLD_STATIC,
    );
}

/// A flat floor tilted by `degrees` around Z, its top plane through the origin.
pub fn ramp_world(degrees: f32) -> (CollisionWorld, Vec3) {
    let rotation = Quat::from_rotation_z(degrees.to_radians());
    let normal = rotation * Vec3::Y;
    let mut world = CollisionWorld::new();
    world.add_brush(
        Brush::oriented_cuboid(-normal * 0.5, rotation, Vec3::new(20.0, 0.5, 20.0)),
        CollisionMask::WORLD_STATIC,
    );
    (world, normal)
}

/// A unit resting on a floor at y = 0.
pub fn grounded_unit(x: f32, config: MovementConfig) -> BasicUnit {
    BasicUnit::new(Vec3::new(x, REST_Y, 0.0), config)
}

/// Capsule bottom height above its resting floor at y = `floor_y`.
pub fn floor_gap(unit: &BasicUnit, floor_y: f32) -> f32 {
    unit.feet().y - floor_y
}

/// Tick `unit` with a constant input for `ticks` ticks, returning every mode seen.
pub fn run(unit: &mut BasicUnit, world: &CollisionWorld, input: Vec3, ticks: usize) -> Vec<MovementMode> {
    let mut modes = Vec::with_capacity(ticks);
    for _ in 0..ticks {
        if input != Vec3::ZERO {
            unit.body.add_input_vector(input);
        }
        unit.tick(world, DT);
        modes.push(unit.mode());
    }
    modes
}
