//! Unit movement physics.
//!
//! A capsule-based character mover with five modes:
//!
//! - Walking: ramp following, floor snapping, step-up over low obstacles,
//!   ledge handling
//! - Falling: gravity, jump force and apex splitting, air control, landing
//! - Swimming and flying: fluid friction, buoyancy
//! - None: no simulation
//!
//! # Design
//!
//! Movement state lives in [`UnitMovement`], owned by its unit. The unit
//! implements [`MovementOwner`] to hand over its transform, capsule, speed
//! table and input each tick, and to receive [`MovementEvent`]s.
//!
//! Each tick is split into sub-steps of at most
//! `max_simulation_time_step`, bounded by `max_simulation_iterations`.
//! Given the same world, config and inputs the results are identical.

mod config;
mod controller;
mod falling;
mod floor;
mod fluid;
mod jump;
mod mode;
mod owner;
mod slide_move;
mod velocity;
mod walking;

pub use config::{
    ConfigError, MovementConfig, SpeedTable, StuckPolicy, BRAKE_TO_STOP_VELOCITY, DEFAULT_WALKABLE_FLOOR_ANGLE,
    MAX_FLOOR_DIST, MIN_FLOOR_DIST, MIN_TICK_TIME, SWEEP_EDGE_REJECT_DISTANCE,
};
pub use controller::UnitMovement;
pub use floor::{is_within_edge_tolerance, FindFloorResult, StepDownResult, AVG_FLOOR_DIST};
pub use jump::JumpState;
pub use mode::{MovementEvent, MovementMode};
pub use owner::{BasicUnit, MoveContext, MovementOwner, Transform, UnitBody};
