//! End-to-end movement scenarios on small hand-built worlds.

mod common;

use common::*;
use glam::Vec3;
use stride_physics::movement::{MAX_FLOOR_DIST, MIN_FLOOR_DIST};
use stride_physics::{BasicUnit, CapsuleShape, CollisionMask, CollisionWorld, MovementConfig, MovementEvent, MovementMode};

/// A platform with its top at y = 0 ending at x = 2, and a lower floor at
/// `lower_y` continuing past it.
fn ledge_world(lower_y: f32) -> CollisionWorld {
    let mut world = CollisionWorld::new();
    world.add_box(Vec3::new(-8.0, -0.5, 0.0), Vec3::new(10.0, 0.5, 10.0), CollisionMask::WORLD_STATIC);
    world.add_box(Vec3::new(17.0, lower_y - 0.5, 0.0), Vec3::new(15.0, 0.5, 10.0), CollisionMask::WORLD_STATIC);
    world
}

fn landed_count(unit: &BasicUnit) -> usize {
    unit.body.events().iter().filter(|e| matches!(e, MovementEvent::Landed { .. })).count()
}

fn assert_resting_on(unit: &BasicUnit, floor_y: f32) {
    let gap = floor_gap(unit, floor_y);
    assert!(
        (MIN_FLOOR_DIST - 1e-3..=MAX_FLOOR_DIST + 1e-3).contains(&gap),
        "gap={} position={:?}",
        gap,
        unit.position()
    );
}

#[test]
fn test_drop_and_land() {
    let world = flat_world();
    let mut unit = BasicUnit::new(Vec3::new(0.0, 3.0, 0.0), MovementConfig::default());

    run(&mut unit, &world, Vec3::ZERO, 1);
    assert_eq!(unit.mode(), MovementMode::Falling);
    assert!(unit.body.events().iter().any(|e| matches!(e, MovementEvent::FallStarted { .. })));

    run(&mut unit, &world, Vec3::ZERO, 120);

    assert_eq!(unit.mode(), MovementMode::Walking);
    assert_eq!(landed_count(&unit), 1);
    assert_resting_on(&unit, 0.0);
    assert_eq!(unit.velocity(), Vec3::ZERO);

    let impact = unit
        .body
        .events()
        .iter()
        .find_map(|e| match e {
            MovementEvent::Landed { impact_velocity, .. } => Some(*impact_velocity),
            _ => None,
        })
        .unwrap_or(Vec3::ZERO);
    assert!(impact.y < -5.0, "impact={:?}", impact);
}

#[test]
fn test_walk_off_ledge_falls_then_lands() {
    let world = ledge_world(-2.0);
    let mut unit = grounded_unit(0.0, MovementConfig::default());

    let modes = run(&mut unit, &world, Vec3::X, 150);

    assert!(modes.contains(&MovementMode::Falling));
    assert_eq!(unit.mode(), MovementMode::Walking);
    assert_eq!(landed_count(&unit), 1);
    assert!(unit.position().x > 2.0);
    assert_resting_on(&unit, -2.0);
}

#[test]
fn test_ledge_blocks_when_walking_off_is_disabled() {
    let world = ledge_world(-2.0);
    let mut config = MovementConfig::default();
    config.can_walk_off_ledges = false;
    let mut unit = grounded_unit(0.0, config);

    let modes = run(&mut unit, &world, Vec3::X, 120);

    assert!(modes.iter().all(|&m| m == MovementMode::Walking), "modes={:?}", modes);
    assert!(unit.position().x < 2.0 + CapsuleShape::HUMANOID.radius, "x={}", unit.position().x);
    assert_resting_on(&unit, 0.0);
}

#[test]
fn test_step_down_keeps_walking() {
    let world = ledge_world(-0.2);
    let mut unit = grounded_unit(0.0, MovementConfig::default());

    let modes = run(&mut unit, &world, Vec3::X, 90);

    assert!(modes.iter().all(|&m| m == MovementMode::Walking), "modes={:?}", modes);
    assert!(unit.position().x > 4.0);
    assert_resting_on(&unit, -0.2);
}

#[test]
fn test_jump_and_land_again() {
    let world = flat_world();
    let mut unit = grounded_unit(0.0, MovementConfig::default());

    unit.jump();
    run(&mut unit, &world, Vec3::ZERO, 1);
    unit.stop_jumping();

    let modes = run(&mut unit, &world, Vec3::ZERO, 120);

    assert!(modes.contains(&MovementMode::Falling));
    assert_eq!(unit.mode(), MovementMode::Walking);
    assert_eq!(landed_count(&unit), 1);
    assert!(unit.body.events().contains(&MovementEvent::Jumped { count: 1 }));
    assert!((unit.position().x).abs() < 1e-4);
    assert_resting_on(&unit, 0.0);
}

#[test]
fn test_jump_reaches_expected_height() {
    let world = flat_world();
    let config = MovementConfig::default();
    let jump_y = config.jump_y_velocity;
    let gravity = config.gravity.abs() * config.gravity_scale;
    let mut unit = grounded_unit(0.0, config);

    unit.jump();
    let mut peak = unit.position().y;
    for _ in 0..90 {
        unit.tick(&world, DT);
        unit.stop_jumping();
        peak = peak.max(unit.position().y);
    }

    let expected = jump_y * jump_y / (2.0 * gravity);
    let rise = peak - REST_Y;
    assert!((rise - expected).abs() < 0.05, "rise={} expected={}", rise, expected);
}

#[test]
fn test_flying_climbs_with_vertical_input() {
    let world = flat_world();
    let mut unit = BasicUnit::new(Vec3::new(0.0, 5.0, 0.0), MovementConfig::default());
    unit.set_movement_mode(&world, MovementMode::Flying);

    run(&mut unit, &world, Vec3::Y, 60);

    assert_eq!(unit.mode(), MovementMode::Flying);
    assert!(unit.position().y > 6.0, "y={}", unit.position().y);
    assert!(unit.position().x.abs() < 1e-4);
}

#[test]
fn test_walking_into_wall_stops_at_surface() {
    let mut world = flat_world();
    world.add_box(Vec3::new(3.5, 1.5, 0.0), Vec3::new(0.5, 1.5, 10.0), CollisionMask::WORLD_STATIC);
    let mut unit = grounded_unit(0.0, MovementConfig::default());

    run(&mut unit, &world, Vec3::X, 90);

    let contact_x = 3.0 - CapsuleShape::HUMANOID.radius;
    assert!(unit.position().x <= contact_x, "x={}", unit.position().x);
    assert!(unit.position().x > contact_x - 0.02, "x={}", unit.position().x);
    assert!(unit.velocity().x.abs() < 0.1, "v={:?}", unit.velocity());
    assert_eq!(unit.mode(), MovementMode::Walking);
}

#[test]
fn test_identical_runs_are_deterministic() {
    let mut world = flat_world();
    add_obstacle(&mut world, 2.0, 0.3);

    let simulate = || {
        let mut unit = grounded_unit(0.0, MovementConfig::default());
        unit.body.add_yaw_input(0.3);
        for tick in 0..120 {
            unit.body.add_input_vector(Vec3::new(1.0, 0.0, 0.25));
            if tick == 60 {
                unit.jump();
            }
            unit.tick(&world, DT);
        }
        (unit.position(), unit.velocity(), unit.mode())
    };

    assert_eq!(simulate(), simulate());
}
