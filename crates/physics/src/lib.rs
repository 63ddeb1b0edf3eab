//! Stride Physics
//!
//! A deterministic character movement core: an upright capsule swept through
//! a world of collidables, walking on floors, stepping over obstacles,
//! sliding along walls, falling, swimming and flying.
//!
//! # Architecture
//!
//! The crate is split into two main systems:
//!
//! - **Collision**: Sweeps capsules through the world, returns hit information
//! - **Movement**: Uses those sweeps to implement the movement modes
//!
//! # Conventions
//!
//! Y is up. Distances are in metres, time in seconds. A unit's position is
//! the centre of its capsule.

pub mod collision;
pub mod movement;

// Re-export commonly used types
pub use collision::{
    BroadPhase, Brush, CapsuleShape, Collidable, CollidableId, CollisionError, CollisionHitResult, CollisionMask,
    CollisionParams, CollisionWorld,
};
pub use movement::{
    BasicUnit, ConfigError, FindFloorResult, MovementConfig, MovementEvent, MovementMode, MovementOwner, SpeedTable,
    StuckPolicy, Transform, UnitBody, UnitMovement,
};
