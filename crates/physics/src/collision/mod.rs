//! Collision queries for unit movement.
//!
//! This module provides capsule sweeps and overlap tests against whatever
//! geometry a broad phase returns.
//!
//! # Key Types
//!
//! - [`Collidable`]: Capability implemented by anything a unit can touch
//! - [`BroadPhase`]: Finds candidate collidables for a query volume
//! - [`CollisionWorld`]: A flat broad phase over parry3d brushes
//! - [`CollisionHitResult`]: Output from a sweep or overlap query
//!
//! # Sweeps
//!
//! A sweep moves a capsule from a start to an end location and reports:
//! - How far the capsule traveled (time 0.0-1.0)
//! - The capsule location at impact
//! - The contact normal and the obstacle's face normal
//! - Whether the capsule already overlapped something, and how deeply

mod collidable;
mod flags;
mod hit;
mod shape;
mod sweep;
mod world;

pub use collidable::{Brush, BrushKind, Collidable, CollisionError};
pub use flags::CollisionMask;
pub use hit::{CollidableId, CollisionHitResult, CollisionParams, CollisionResult};
pub use shape::{Aabb, Capsule, CapsuleShape};
pub use sweep::{line_trace, overlap_multi, overlap_test, sweep_multi, sweep_single, LINE_TRACE_RADIUS};
pub use world::{BroadPhase, CollisionWorld};
