//! Stride - Headless Scenario Runner
//!
//! Runs a unit through a small test course (flat floor, a low step, a wall
//! and a ledge) and prints its trajectory and movement events.
//!
//! Usage: `stride [config.json]`

use glam::Vec3;
use stride_physics::{BasicUnit, CollisionMask, CollisionWorld, MovementConfig, MovementEvent};

const TICK_RATE: f32 = 60.0;
const DURATION_SECONDS: f32 = 6.0;
const REPORT_EVERY: usize = 30;

/// Load movement tuning from the JSON file at `path`, or defaults on failure.
fn load_config(path: Option<&str>) -> MovementConfig {
    let Some(path) = path else {
        return MovementConfig::default();
    };
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => {
            log::warn!("could not read {path}: {err}, using defaults");
            return MovementConfig::default();
        }
    };
    match MovementConfig::from_json_str(&text) {
        Ok(config) => {
            log::info!("loaded movement config from {path}");
            config
        }
        Err(err) => {
            log::warn!("invalid config {path}: {err}, using defaults");
            MovementConfig::default()
        }
    }
}

/// Floor at y = 0, a 0.3 step at x = 4, a raised deck ending in a ledge at
/// x = 14 and a pit floor at y = -1.5 beyond it, walled off at x = 22.
fn build_course() -> CollisionWorld {
    let mut world = CollisionWorld::new();
    world.add_box(Vec3::new(2.0, -0.5, 0.0), Vec3::new(12.0, 0.5, 10.0), CollisionMask::WORLD_STATIC);
    world.add_box(Vec3::new(9.0, 0.15, 0.0), Vec3::new(5.0, 0.15, 10.0), CollisionMask::WORLD_STATIC);
    world.add_box(Vec3::new(20.0, -2.0, 0.0), Vec3::new(6.0, 0.5, 10.0), CollisionMask::WORLD_STATIC);
    world.add_box(Vec3::new(22.5, 0.0, 0.0), Vec3::new(0.5, 3.0, 10.0), CollisionMask::WORLD_STATIC);
    world
}

fn describe(event: &MovementEvent) -> String {
    match event {
        MovementEvent::ModeChanged { from, to } => format!("mode {from} -> {to}"),
        MovementEvent::FallStarted { location } => format!("fall started at {location:.2}"),
        MovementEvent::Landed {
            location,
            impact_velocity,
        } => format!("landed at {location:.2} (impact {impact_velocity:.2})"),
        MovementEvent::Jumped { count } => format!("jump #{count}"),
        MovementEvent::StuckInGeometry { location } => format!("stuck at {location:.2}"),
    }
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let config = load_config(args.get(1).map(String::as_str));
    let world = build_course();
    let dt = 1.0 / TICK_RATE;
    let ticks = (DURATION_SECONDS * TICK_RATE) as usize;

    let mut unit = BasicUnit::new(Vec3::new(0.0, 1.5, 0.0), config);
    log::info!("running {ticks} ticks at {TICK_RATE} Hz");

    for tick in 0..ticks {
        unit.body.add_input_vector(Vec3::X);
        // Hop once on the deck.
        if tick == 150 {
            unit.jump();
        } else if tick == 151 {
            unit.stop_jumping();
        }

        unit.tick(&world, dt);

        for event in unit.body.drain_events() {
            println!("[{tick:4}] {}", describe(&event));
        }
        if tick % REPORT_EVERY == 0 {
            println!(
                "[{tick:4}] {:<8} pos {:.3} vel {:.3}",
                unit.mode().to_string(),
                unit.position(),
                unit.velocity()
            );
        }
    }

    println!("final: {} at {:.3}", unit.mode(), unit.position());
}
