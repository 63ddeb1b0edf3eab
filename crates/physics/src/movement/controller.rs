//! Unit movement component.
//!
//! [`UnitMovement`] is the per-unit movement state and the mode state
//! machine driving it. Each tick it consumes the owner's input, handles
//! jumping, and then runs the physics for the active mode in bounded
//! sub-steps until the tick's time is used up.
//!
//! The mode-specific physics live in sibling modules as further
//! `impl UnitMovement` blocks: `walking`, `falling`, `fluid`, `floor`,
//! `velocity` and `slide_move`.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::collision::{overlap_test, BroadPhase, CollisionHitResult, CollisionMask, CollisionParams};

use super::config::{ConfigError, MovementConfig, SpeedTable, StuckPolicy, MIN_TICK_TIME};
use super::floor::FindFloorResult;
use super::jump::JumpState;
use super::mode::{MovementEvent, MovementMode};
use super::owner::{MoveContext, MovementOwner};

/// How a mode's physics call ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum PhysicsOutcome {
    /// The time given was used up (or dropped at the iteration cap).
    Finished,
    /// The mode changed; `remaining` seconds go to the new mode.
    Continue { remaining: f32 },
}

/// Movement state of one unit.
///
/// # Example
///
/// ```ignore
/// let mut movement = UnitMovement::new(MovementConfig::default());
///
/// // Each frame, with `unit` implementing MovementOwner:
/// movement.tick(&mut unit, &world, delta_time);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitMovement {
    pub(crate) config: MovementConfig,
    pub(crate) mode: MovementMode,
    pub(crate) velocity: Vec3,
    /// Input acceleration for the current tick.
    pub(crate) acceleration: Vec3,
    /// Fraction of full input requested this tick, in [0, 1].
    pub(crate) analog_input_modifier: f32,
    pub(crate) jump: JumpState,
    /// Floor under the unit as of the last floor check.
    pub(crate) current_floor: FindFloorResult,
    /// Owner's speed table, cached at the start of each tick.
    pub(crate) speeds: SpeedTable,
    /// The last move was a teleport; don't derive velocity from it.
    pub(crate) just_teleported: bool,
    pub(crate) force_next_floor_check: bool,
    /// Last end-of-tick location at which the capsule overlapped nothing.
    pub(crate) last_valid_location: Option<Vec3>,
    /// Location at the end of the previous tick.
    pub(crate) last_update_location: Option<Vec3>,
    /// Inside a stuck-in-geometry episode.
    pub(crate) stuck: bool,
    pub(crate) num_jump_apex_attempts: u32,
}

impl UnitMovement {
    /// Create a movement component in walking mode.
    pub fn new(config: MovementConfig) -> Self {
        Self {
            config,
            mode: MovementMode::Walking,
            velocity: Vec3::ZERO,
            acceleration: Vec3::ZERO,
            analog_input_modifier: 0.0,
            jump: JumpState::new(),
            current_floor: FindFloorResult::default(),
            speeds: SpeedTable::default(),
            just_teleported: false,
            force_next_floor_check: true,
            last_valid_location: None,
            last_update_location: None,
            stuck: false,
            num_jump_apex_attempts: 0,
        }
    }

    /// Create a movement component after validating `config`.
    pub fn try_new(config: MovementConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(config))
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[inline]
    pub fn config(&self) -> &MovementConfig {
        &self.config
    }

    /// Mutable tunables. Changes apply from the next tick.
    #[inline]
    pub fn config_mut(&mut self) -> &mut MovementConfig {
        &mut self.config
    }

    #[inline]
    pub fn mode(&self) -> MovementMode {
        self.mode
    }

    #[inline]
    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    pub fn set_velocity(&mut self, velocity: Vec3) {
        self.velocity = velocity;
    }

    /// Input acceleration of the last tick.
    #[inline]
    pub fn acceleration(&self) -> Vec3 {
        self.acceleration
    }

    #[inline]
    pub fn analog_input_modifier(&self) -> f32 {
        self.analog_input_modifier
    }

    #[inline]
    pub fn current_floor(&self) -> &FindFloorResult {
        &self.current_floor
    }

    #[inline]
    pub fn jump_state(&self) -> &JumpState {
        &self.jump
    }

    #[inline]
    pub fn last_valid_location(&self) -> Option<Vec3> {
        self.last_valid_location
    }

    #[inline]
    pub fn is_falling(&self) -> bool {
        self.mode == MovementMode::Falling
    }

    /// Walking on the ground.
    #[inline]
    pub fn is_moving_on_ground(&self) -> bool {
        self.mode == MovementMode::Walking
    }

    #[inline]
    pub fn is_swimming(&self) -> bool {
        self.mode == MovementMode::Swimming
    }

    #[inline]
    pub fn is_flying(&self) -> bool {
        self.mode == MovementMode::Flying
    }

    // ========================================================================
    // Tick
    // ========================================================================

    /// Simulate one tick of `delta_seconds`.
    ///
    /// Input and yaw are consumed from the owner even when nothing is
    /// simulated, so they never pile up across ticks.
    pub fn tick(&mut self, owner: &mut dyn MovementOwner, world: &dyn BroadPhase, delta_seconds: f32) {
        let mut ctx = MoveContext::new(owner, world);
        self.speeds = ctx.owner.speeds();

        let yaw = ctx.owner.consume_yaw_input();
        if yaw != 0.0 {
            let rotation = (Quat::from_rotation_y(yaw) * ctx.rotation()).normalize();
            let location = ctx.location();
            ctx.set_location_and_rotation(location, rotation);
        }
        let input = ctx.owner.consume_input_vector();

        if self.mode == MovementMode::None || delta_seconds < MIN_TICK_TIME {
            return;
        }

        self.check_jump_input(&mut ctx);

        self.acceleration = self.input_acceleration(input);
        self.analog_input_modifier = self.compute_analog_input_modifier();

        // Moved by something other than us since the last tick.
        if self.last_update_location != Some(ctx.location()) {
            self.force_next_floor_check = true;
        }

        self.num_jump_apex_attempts = 0;
        let mut iterations = 0;
        self.start_new_physics(&mut ctx, delta_seconds, &mut iterations);

        self.clear_jump_input(delta_seconds);

        let location = ctx.location();
        let params = CollisionParams::multi(CollisionMask::MASK_MOVEMENT);
        if !overlap_test(world, location, &ctx.shape, &params) {
            self.last_valid_location = Some(location);
            self.stuck = false;
        }
        self.last_update_location = Some(location);
    }

    /// Run mode physics until `delta_time` is used up or the iteration cap
    /// is hit. A mode change hands the rest of the time to the new mode.
    pub(crate) fn start_new_physics(&mut self, ctx: &mut MoveContext<'_>, delta_time: f32, iterations: &mut u32) {
        let mut remaining = delta_time;

        while remaining >= MIN_TICK_TIME {
            if *iterations >= self.config.max_simulation_iterations {
                self.log_dropped_time(remaining, *iterations);
                break;
            }

            let iterations_before = *iterations;
            let outcome = match self.mode {
                MovementMode::None => PhysicsOutcome::Finished,
                MovementMode::Walking => self.phys_walking(ctx, remaining, iterations),
                MovementMode::Falling => self.phys_falling(ctx, remaining, iterations),
                MovementMode::Swimming => self.phys_fluid(ctx, remaining, iterations, true),
                MovementMode::Flying => self.phys_fluid(ctx, remaining, iterations, false),
            };

            match outcome {
                PhysicsOutcome::Finished => break,
                PhysicsOutcome::Continue { remaining: rest } => {
                    // Every hand-off costs an iteration, so mode ping-pong terminates.
                    if *iterations == iterations_before {
                        *iterations += 1;
                    }
                    remaining = rest;
                }
            }
        }
    }

    /// Length of the next sub-step.
    ///
    /// Long remainders are split so no sub-step exceeds
    /// `max_simulation_time_step`, halving to avoid a tiny final step.
    /// Past the iteration cap the remainder is taken in one step.
    pub(crate) fn simulation_time_step(&self, remaining: f32, iterations: u32) -> f32 {
        let max_step = self.config.max_simulation_time_step;
        let mut step = remaining;
        if remaining > max_step && iterations < self.config.max_simulation_iterations {
            step = max_step.min(remaining * 0.5);
        }
        step.max(MIN_TICK_TIME)
    }

    pub(crate) fn log_dropped_time(&self, remaining: f32, iterations: u32) {
        if remaining >= MIN_TICK_TIME && iterations >= self.config.max_simulation_iterations {
            log::trace!("{} iterations in {}, dropping {remaining:.5}s", iterations, self.mode);
        }
    }

    // ========================================================================
    // Mode changes
    // ========================================================================

    /// Switch mode, running the new mode's entry side effects.
    pub fn set_movement_mode(&mut self, owner: &mut dyn MovementOwner, world: &dyn BroadPhase, mode: MovementMode) {
        let mut ctx = MoveContext::new(owner, world);
        self.set_mode(&mut ctx, mode);
    }

    pub(crate) fn set_mode(&mut self, ctx: &mut MoveContext<'_>, new_mode: MovementMode) {
        if new_mode == self.mode {
            return;
        }
        let previous = self.mode;
        self.mode = new_mode;

        match new_mode {
            MovementMode::Walking => {
                self.velocity.y = 0.0;
                self.refresh_floor(ctx);
            }
            MovementMode::None => {
                self.velocity = Vec3::ZERO;
                self.acceleration = Vec3::ZERO;
                self.current_floor.clear();
            }
            _ => self.current_floor.clear(),
        }

        if !self.jump.is_pressed() || !self.is_falling() {
            let falling = self.is_falling();
            self.jump.reset(falling);
        }

        log::debug!("movement mode {previous} -> {new_mode}");
        ctx.emit(MovementEvent::ModeChanged {
            from: previous,
            to: new_mode,
        });

        if new_mode == MovementMode::Falling {
            ctx.owner.on_started_falling();
            let location = ctx.location();
            ctx.emit(MovementEvent::FallStarted { location });
        }
    }

    // ========================================================================
    // Jumping
    // ========================================================================

    /// Press the jump button. The jump happens on the next tick.
    pub fn jump(&mut self) {
        self.jump.press();
    }

    /// Release the jump button.
    pub fn stop_jumping(&mut self) {
        let falling = self.is_falling();
        self.jump.reset(falling);
    }

    /// Whether a jump may start (or a held jump continue) right now.
    pub fn can_jump(&self, owner: &dyn MovementOwner) -> bool {
        let mode_allows = matches!(self.mode, MovementMode::Walking | MovementMode::Falling);
        mode_allows
            && self
                .jump
                .allows_jump(self.is_falling(), self.config.jump_max_count, self.config.jump_max_hold_time)
            && owner.can_jump()
    }

    /// Launch the unit upwards immediately.
    ///
    /// Vertical velocity becomes at least `jump_y_velocity`; a unit already
    /// moving up faster keeps its speed.
    pub fn do_jump(&mut self, owner: &mut dyn MovementOwner, world: &dyn BroadPhase) -> bool {
        let mut ctx = MoveContext::new(owner, world);
        self.apply_jump(&mut ctx)
    }

    pub(crate) fn apply_jump(&mut self, ctx: &mut MoveContext<'_>) -> bool {
        self.velocity.y = self.velocity.y.max(self.config.jump_y_velocity);
        self.set_mode(ctx, MovementMode::Falling);
        true
    }

    /// Start or sustain a jump if the button is held.
    pub(crate) fn check_jump_input(&mut self, ctx: &mut MoveContext<'_>) {
        let falling = self.is_falling();
        if !self.jump.begin_check(falling) {
            return;
        }

        let did_jump = self.can_jump(&*ctx.owner) && self.apply_jump(ctx);
        if let Some(count) = self.jump.finish_check(did_jump, self.config.jump_max_hold_time) {
            log::debug!("jump {count} at {:?}", ctx.location());
            ctx.owner.on_jumped();
            ctx.emit(MovementEvent::Jumped { count });
        }
    }

    /// Age the held jump button after physics ran.
    pub(crate) fn clear_jump_input(&mut self, delta_seconds: f32) {
        self.jump.clear_input(delta_seconds, self.config.jump_max_hold_time);
    }

    // ========================================================================
    // Stuck in geometry
    // ========================================================================

    /// Last resort when depenetration failed.
    pub(crate) fn handle_stuck(&mut self, ctx: &mut MoveContext<'_>, hit: &CollisionHitResult) {
        let location = ctx.location();
        if !self.stuck {
            self.stuck = true;
            log::warn!(
                "stuck in geometry at {location:?}, depth {:.4}, policy {:?}",
                hit.penetration_depth,
                self.config.stuck_policy
            );
            ctx.emit(MovementEvent::StuckInGeometry { location });
        }

        if self.config.stuck_policy == StuckPolicy::RevertToLastValid {
            let params = CollisionParams::multi(CollisionMask::MASK_MOVEMENT);
            let target = self
                .last_valid_location
                .filter(|&valid| valid != location && !overlap_test(ctx.world, valid, &ctx.shape, &params));
            if let Some(valid) = target {
                ctx.set_location(valid);
                self.velocity = Vec3::ZERO;
                self.just_teleported = true;
                self.force_next_floor_check = true;
                return;
            }
        }

        // Keep the overlap; just stop pushing further in.
        let into_contact = self.velocity.dot(hit.normal);
        if into_contact < 0.0 {
            self.velocity -= hit.normal * into_contact;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::{CollidableId, CollisionResult, CollisionWorld};
    use crate::movement::owner::UnitBody;

    fn ground() -> CollisionWorld {
        let mut world = CollisionWorld::new();
        world.add_box(Vec3::new(0.0, -0.5, 0.0), Vec3::new(20.0, 0.5, 20.0), CollisionMask::WORLD_STATIC);
        world
    }

    fn penetrating_hit(normal: Vec3) -> CollisionHitResult {
        CollisionHitResult::from_result(
            Vec3::ZERO,
            Vec3::ZERO,
            CollidableId(0),
            &CollisionResult {
                has_collision: true,
                time: 0.0,
                distance: 0.0,
                normal,
                impact_normal: normal,
                impact_point: Vec3::ZERO,
                start_penetrating: true,
                penetration_depth: 0.1,
            },
        )
    }

    #[test]
    fn test_time_step_splits_long_remainders() {
        let movement = UnitMovement::new(MovementConfig::default());
        let max_step = movement.config.max_simulation_time_step;

        assert_eq!(movement.simulation_time_step(0.01, 1), 0.01);
        // Just over the max: halve instead of leaving a sliver.
        let step = movement.simulation_time_step(max_step * 1.2, 1);
        assert!((step - max_step * 0.6).abs() < 1e-6, "step={}", step);
        assert_eq!(movement.simulation_time_step(1.0, 1), max_step);
        // At the cap the whole remainder goes at once.
        let cap = movement.config.max_simulation_iterations;
        assert_eq!(movement.simulation_time_step(1.0, cap), 1.0);
        assert_eq!(movement.simulation_time_step(0.0, 1), MIN_TICK_TIME);
    }

    #[test]
    fn test_mode_change_events() {
        let world = ground();
        let mut body = UnitBody::new(Vec3::new(0.0, 5.0, 0.0));
        let mut movement = UnitMovement::new(MovementConfig::default());

        movement.set_movement_mode(&mut body, &world, MovementMode::Falling);
        movement.set_movement_mode(&mut body, &world, MovementMode::Falling);

        let events = body.drain_events();
        assert_eq!(events.len(), 2, "events={:?}", events);
        assert_eq!(
            events[0],
            MovementEvent::ModeChanged {
                from: MovementMode::Walking,
                to: MovementMode::Falling
            }
        );
        assert!(matches!(events[1], MovementEvent::FallStarted { .. }));
    }

    #[test]
    fn test_entering_walking_flattens_velocity_and_snaps() {
        let world = ground();
        // Bottom 0.1 above the floor.
        let mut body = UnitBody::new(Vec3::new(0.0, 1.0, 0.0));
        let mut movement = UnitMovement::new(MovementConfig::default());
        movement.mode = MovementMode::Falling;
        movement.velocity = Vec3::new(1.0, -3.0, 0.0);

        movement.set_movement_mode(&mut body, &world, MovementMode::Walking);

        assert_eq!(movement.velocity, Vec3::new(1.0, 0.0, 0.0));
        assert!(movement.current_floor.is_walkable_floor());
        let gap = body.transform.position.y - 0.9;
        assert!(gap >= 0.019 - 1e-4 && gap <= 0.024 + 1e-4, "gap={}", gap);
    }

    #[test]
    fn test_entering_none_stops_everything() {
        let world = ground();
        let mut body = UnitBody::new(Vec3::new(0.0, 0.92, 0.0));
        let mut movement = UnitMovement::new(MovementConfig::default());
        movement.velocity = Vec3::new(3.0, 0.0, 0.0);
        movement.jump();

        movement.set_movement_mode(&mut body, &world, MovementMode::None);

        assert_eq!(movement.velocity, Vec3::ZERO);
        assert!(!movement.jump_state().is_pressed());

        body.add_input_vector(Vec3::X);
        movement.tick(&mut body, &world, 1.0 / 60.0);
        assert_eq!(body.transform.position, Vec3::new(0.0, 0.92, 0.0));
    }

    #[test]
    fn test_do_jump_never_lowers_vertical_velocity() {
        let world = ground();
        let mut body = UnitBody::new(Vec3::new(0.0, 5.0, 0.0));
        let mut movement = UnitMovement::new(MovementConfig::default());

        movement.velocity = Vec3::new(0.0, 10.0, 0.0);
        assert!(movement.do_jump(&mut body, &world));
        assert_eq!(movement.velocity.y, 10.0);
        assert!(movement.is_falling());
    }

    #[test]
    fn test_jump_respects_owner_veto() {
        let world = ground();
        let mut body = UnitBody::new(Vec3::new(0.0, 0.9215, 0.0));
        body.jump_allowed = false;
        let mut movement = UnitMovement::new(MovementConfig::default());

        movement.jump();
        movement.tick(&mut body, &world, 1.0 / 60.0);

        assert!(movement.is_moving_on_ground());
        assert!(!body.events().iter().any(|e| matches!(e, MovementEvent::Jumped { .. })));
    }

    #[test]
    fn test_stuck_reverts_to_last_valid_location() {
        let world = ground();
        let mut body = UnitBody::new(Vec3::new(0.0, 0.5, 0.0));
        let mut ctx = MoveContext::new(&mut body, &world);
        let mut movement = UnitMovement::new(MovementConfig::default());
        movement.last_valid_location = Some(Vec3::new(0.0, 2.0, 0.0));
        movement.velocity = Vec3::new(1.0, -2.0, 0.0);

        movement.handle_stuck(&mut ctx, &penetrating_hit(Vec3::Y));
        movement.handle_stuck(&mut ctx, &penetrating_hit(Vec3::Y));

        assert_eq!(ctx.location(), Vec3::new(0.0, 2.0, 0.0));
        assert_eq!(movement.velocity, Vec3::ZERO);
        assert!(movement.just_teleported);
        let stuck_events = body
            .events()
            .iter()
            .filter(|e| matches!(e, MovementEvent::StuckInGeometry { .. }))
            .count();
        assert_eq!(stuck_events, 1);
    }

    #[test]
    fn test_stuck_accepts_overlap() {
        let world = ground();
        let mut body = UnitBody::new(Vec3::new(0.0, 0.5, 0.0));
        let mut ctx = MoveContext::new(&mut body, &world);
        let mut config = MovementConfig::default();
        config.stuck_policy = StuckPolicy::AcceptOverlap;
        let mut movement = UnitMovement::new(config);
        movement.last_valid_location = Some(Vec3::new(0.0, 2.0, 0.0));
        movement.velocity = Vec3::new(1.0, -2.0, 0.0);

        movement.handle_stuck(&mut ctx, &penetrating_hit(Vec3::Y));

        assert_eq!(ctx.location(), Vec3::new(0.0, 0.5, 0.0));
        assert_eq!(movement.velocity, Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = MovementConfig::default();
        config.max_simulation_iterations = 0;
        assert!(UnitMovement::try_new(config).is_err());
    }

    #[test]
    fn test_snapshot_restores_state() {
        let mut movement = UnitMovement::new(MovementConfig::arcade());
        movement.velocity = Vec3::new(1.0, 2.0, 3.0);
        movement.mode = MovementMode::Flying;

        let json = serde_json::to_string(&movement).unwrap();
        let restored: UnitMovement = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.mode(), MovementMode::Flying);
        assert_eq!(restored.velocity(), movement.velocity());
        assert_eq!(restored.config().walkable_floor_y(), movement.config().walkable_floor_y());
    }
}
