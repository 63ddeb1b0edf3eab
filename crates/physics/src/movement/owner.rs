//! The owning unit's side of the movement contract.
//!
//! A [`UnitMovement`] never owns the unit's transform, input or speed
//! table. It reads them each tick through [`MovementOwner`] and writes the
//! resulting transform back. [`BasicUnit`] is a ready-made owner for
//! headless simulation and tests.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::collision::{BroadPhase, CapsuleShape, CollisionHitResult};

use super::config::{MovementConfig, SpeedTable};
use super::controller::UnitMovement;
use super::mode::{MovementEvent, MovementMode};

/// World-space placement of a unit's node. `position` is the capsule centre.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Transform {
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::from_position(Vec3::ZERO)
    }
}

/// Capabilities a unit exposes to its movement component.
///
/// Input and yaw are consumed once per tick: the owner must clear them when
/// they are read.
pub trait MovementOwner {
    /// Current transform of the unit's node.
    fn transform(&self) -> Transform;

    /// Write back the simulated transform.
    fn set_transform(&mut self, transform: Transform);

    /// Collision capsule of the unit.
    fn capsule(&self) -> CapsuleShape;

    /// Maximum speeds per movement mode.
    fn speeds(&self) -> SpeedTable;

    /// Take the accumulated input direction. Length above 1 is clamped.
    fn consume_input_vector(&mut self) -> Vec3;

    /// Take the accumulated yaw input (radians).
    fn consume_yaw_input(&mut self) -> f32;

    /// Gameplay veto on jumping (stunned, rooted, ...).
    fn can_jump(&self) -> bool {
        true
    }

    fn on_jumped(&mut self) {}

    fn on_started_falling(&mut self) {}

    fn on_landed(&mut self, _hit: &CollisionHitResult) {}

    /// Every [`MovementEvent`] is delivered here.
    fn on_movement_event(&mut self, _event: MovementEvent) {}
}

/// Everything one simulation call needs besides the movement state itself.
pub struct MoveContext<'a> {
    pub owner: &'a mut dyn MovementOwner,
    pub world: &'a dyn BroadPhase,
    pub shape: CapsuleShape,
}

impl<'a> MoveContext<'a> {
    pub fn new(owner: &'a mut dyn MovementOwner, world: &'a dyn BroadPhase) -> Self {
        let shape = owner.capsule();
        Self { owner, world, shape }
    }

    #[inline]
    pub fn location(&self) -> Vec3 {
        self.owner.transform().position
    }

    #[inline]
    pub fn rotation(&self) -> Quat {
        self.owner.transform().rotation
    }

    pub fn set_location(&mut self, position: Vec3) {
        let rotation = self.rotation();
        self.owner.set_transform(Transform { position, rotation });
    }

    pub fn set_location_and_rotation(&mut self, position: Vec3, rotation: Quat) {
        self.owner.set_transform(Transform { position, rotation });
    }

    pub fn emit(&mut self, event: MovementEvent) {
        self.owner.on_movement_event(event);
    }
}

// ============================================================================
// Reference owner
// ============================================================================

/// A plain unit body: transform, capsule, speeds, pending input and a log
/// of the movement events it received.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitBody {
    pub transform: Transform,
    pub capsule: CapsuleShape,
    pub speeds: SpeedTable,
    /// Gameplay veto on jumping.
    pub jump_allowed: bool,
    pending_input: Vec3,
    pending_yaw: f32,
    events: Vec<MovementEvent>,
}

impl UnitBody {
    pub fn new(position: Vec3) -> Self {
        Self {
            transform: Transform::from_position(position),
            capsule: CapsuleShape::HUMANOID,
            speeds: SpeedTable::default(),
            jump_allowed: true,
            pending_input: Vec3::ZERO,
            pending_yaw: 0.0,
            events: Vec::new(),
        }
    }

    /// Accumulate input for the next tick.
    pub fn add_input_vector(&mut self, direction: Vec3) {
        self.pending_input += direction;
    }

    /// Accumulate yaw input (radians) for the next tick.
    pub fn add_yaw_input(&mut self, radians: f32) {
        self.pending_yaw += radians;
    }

    /// Events received so far.
    pub fn events(&self) -> &[MovementEvent] {
        &self.events
    }

    /// Take every event received so far.
    pub fn drain_events(&mut self) -> Vec<MovementEvent> {
        std::mem::take(&mut self.events)
    }
}

impl MovementOwner for UnitBody {
    fn transform(&self) -> Transform {
        self.transform
    }

    fn set_transform(&mut self, transform: Transform) {
        self.transform = transform;
    }

    fn capsule(&self) -> CapsuleShape {
        self.capsule
    }

    fn speeds(&self) -> SpeedTable {
        self.speeds
    }

    fn consume_input_vector(&mut self) -> Vec3 {
        std::mem::take(&mut self.pending_input)
    }

    fn consume_yaw_input(&mut self) -> f32 {
        std::mem::take(&mut self.pending_yaw)
    }

    fn can_jump(&self) -> bool {
        self.jump_allowed
    }

    fn on_movement_event(&mut self, event: MovementEvent) {
        self.events.push(event);
    }
}

/// A unit body together with the movement component that drives it.
///
/// # Example
///
/// ```ignore
/// let mut unit = BasicUnit::new(spawn, MovementConfig::default());
///
/// // Each frame:
/// unit.body.add_input_vector(Vec3::X);
/// unit.tick(&world, delta_time);
/// ```
#[derive(Debug, Clone)]
pub struct BasicUnit {
    pub body: UnitBody,
    pub movement: UnitMovement,
}

impl BasicUnit {
    pub fn new(position: Vec3, config: MovementConfig) -> Self {
        Self {
            body: UnitBody::new(position),
            movement: UnitMovement::new(config),
        }
    }

    /// Simulate one tick.
    pub fn tick(&mut self, world: &dyn BroadPhase, delta_seconds: f32) {
        self.movement.tick(&mut self.body, world, delta_seconds);
    }

    /// Force a movement mode, running its entry side effects.
    pub fn set_movement_mode(&mut self, world: &dyn BroadPhase, mode: MovementMode) {
        self.movement.set_movement_mode(&mut self.body, world, mode);
    }

    pub fn jump(&mut self) {
        self.movement.jump();
    }

    pub fn stop_jumping(&mut self) {
        self.movement.stop_jumping();
    }

    #[inline]
    pub fn position(&self) -> Vec3 {
        self.body.transform.position
    }

    /// World position of the capsule's lowest point.
    #[inline]
    pub fn feet(&self) -> Vec3 {
        self.position() - Vec3::Y * self.body.capsule.half_height
    }

    #[inline]
    pub fn velocity(&self) -> Vec3 {
        self.movement.velocity()
    }

    #[inline]
    pub fn mode(&self) -> MovementMode {
        self.movement.mode()
    }
}
