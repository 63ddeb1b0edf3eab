//! Velocity and acceleration model.
//!
//! # Key Functions
//!
//! - [`UnitMovement::calc_velocity`]: Friction, braking and input acceleration for one sub-step
//! - [`UnitMovement::apply_velocity_braking`]: Sub-stepped deceleration toward zero
//!
//! Input acceleration steers the current velocity toward the input
//! direction at a rate set by friction, then accelerates up to the
//! analog-scaled mode speed. Without input, or above the speed cap, the
//! unit brakes instead.

use glam::Vec3;

use super::config::{BRAKE_TO_STOP_VELOCITY, MIN_TICK_TIME};
use super::controller::UnitMovement;
use super::mode::MovementMode;

/// Speeds are allowed to exceed the cap by this fraction (squared) before braking.
const OVER_VELOCITY_PERCENT: f32 = 1.01;

/// Squared speeds below this snap to zero after braking.
const BRAKE_SNAP_SPEED_SQ: f32 = 1.0e-8;

/// Squared lateral falling speeds below this snap to zero.
const LATERAL_SNAP_SPEED_SQ: f32 = 1.0e-7;

impl UnitMovement {
    /// Speed cap of the current mode.
    pub fn max_speed(&self) -> f32 {
        match self.mode {
            MovementMode::Walking | MovementMode::Falling => self.speeds.run,
            MovementMode::Swimming => self.speeds.swim,
            MovementMode::Flying => self.speeds.flight,
            MovementMode::None => 0.0,
        }
    }

    /// Lowest speed analog input may ask for in the current mode.
    pub fn min_analog_speed(&self) -> f32 {
        match self.mode {
            MovementMode::Walking | MovementMode::Falling => self.config.min_analog_walk_speed,
            _ => 0.0,
        }
    }

    /// Braking deceleration of the current mode.
    pub fn max_braking_deceleration(&self) -> f32 {
        match self.mode {
            MovementMode::Walking => self.config.braking_deceleration_walking,
            MovementMode::Falling => self.config.braking_deceleration_falling,
            MovementMode::Swimming => self.config.braking_deceleration_swimming,
            MovementMode::Flying => self.config.braking_deceleration_flying,
            MovementMode::None => 0.0,
        }
    }

    /// Check whether velocity exceeds `max_speed` by more than the tolerance.
    pub fn is_exceeding_max_speed(&self, max_speed: f32) -> bool {
        let max_speed = max_speed.max(0.0);
        self.velocity.length_squared() > max_speed * max_speed * OVER_VELOCITY_PERCENT
    }

    /// Drop the vertical part of input unless the mode allows it, and turn
    /// the input direction into an acceleration.
    pub(crate) fn input_acceleration(&self, input: Vec3) -> Vec3 {
        let constrained = if self.mode.allows_vertical_input() {
            input
        } else {
            Vec3::new(input.x, 0.0, input.z)
        };
        constrained.clamp_length_max(1.0) * self.config.max_acceleration
    }

    /// Fraction of full acceleration requested this tick.
    pub(crate) fn compute_analog_input_modifier(&self) -> f32 {
        let max_accel = self.config.max_acceleration;
        if self.acceleration.length_squared() > 0.0 && max_accel > f32::EPSILON {
            (self.acceleration.length() / max_accel).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Update velocity for one sub-step from the current acceleration.
    pub fn calc_velocity(&mut self, dt: f32, friction: f32, fluid: bool, braking_deceleration: f32) {
        if dt < MIN_TICK_TIME {
            return;
        }

        let friction = friction.max(0.0);
        let max_speed = self.max_speed();
        let max_input_speed = (max_speed * self.analog_input_modifier).max(self.min_analog_speed());

        let zero_acceleration = self.acceleration == Vec3::ZERO;
        let velocity_over_max = self.is_exceeding_max_speed(max_input_speed);

        if zero_acceleration || velocity_over_max {
            let old_velocity = self.velocity;
            let braking_friction = if self.config.use_separate_braking_friction {
                self.config.braking_friction
            } else {
                friction
            };
            self.apply_velocity_braking(dt, braking_friction, braking_deceleration);

            // Still accelerating forward: don't brake below the cap we started above.
            if velocity_over_max
                && self.velocity.length_squared() < max_input_speed * max_input_speed
                && self.acceleration.dot(old_velocity) > 0.0
            {
                self.velocity = old_velocity.normalize_or_zero() * max_input_speed;
            }
        } else {
            // Friction limits how fast the unit can change direction.
            let accel_dir = self.acceleration.normalize_or_zero();
            let speed = self.velocity.length();
            self.velocity -= (self.velocity - accel_dir * speed) * (dt * friction).min(1.0);
        }

        if fluid {
            self.velocity *= 1.0 - (friction * dt).min(1.0);
        }

        if !zero_acceleration {
            let new_max_input_speed = if self.is_exceeding_max_speed(max_input_speed) {
                self.velocity.length()
            } else {
                max_input_speed
            };
            self.velocity += self.acceleration * dt;
            self.velocity = self.velocity.clamp_length_max(new_max_input_speed);
        }
    }

    /// Decelerate toward zero using friction and a constant deceleration.
    pub fn apply_velocity_braking(&mut self, dt: f32, friction: f32, braking_deceleration: f32) {
        if self.velocity == Vec3::ZERO || dt < MIN_TICK_TIME {
            return;
        }

        let friction_factor = self.config.braking_friction_factor.max(0.0);
        let friction = (friction * friction_factor).max(0.0);
        let braking_deceleration = braking_deceleration.max(0.0);
        let zero_friction = friction == 0.0;
        let zero_braking = braking_deceleration == 0.0;

        if zero_friction && zero_braking {
            return;
        }

        let old_velocity = self.velocity;
        let max_time_step = self.config.braking_sub_step_time.clamp(1.0 / 75.0, 1.0 / 20.0);
        let rev_accel = if zero_braking {
            Vec3::ZERO
        } else {
            -braking_deceleration * self.velocity.normalize_or_zero()
        };

        let mut remaining = dt;
        while remaining >= MIN_TICK_TIME {
            // Constant deceleration integrates exactly in one step.
            let step = if remaining > max_time_step && !zero_friction {
                max_time_step.min(remaining * 0.5)
            } else {
                remaining
            };
            remaining -= step;

            self.velocity += (-friction * self.velocity + rev_accel) * step;

            if self.velocity.dot(old_velocity) <= 0.0 {
                self.velocity = Vec3::ZERO;
                return;
            }
        }

        let speed_sq = self.velocity.length_squared();
        if speed_sq <= BRAKE_SNAP_SPEED_SQ
            || (!zero_braking && speed_sq <= BRAKE_TO_STOP_VELOCITY * BRAKE_TO_STOP_VELOCITY)
        {
            self.velocity = Vec3::ZERO;
        }
    }

    /// Keep ground velocity horizontal (or rotate it onto the horizontal
    /// plane at the same speed).
    pub(crate) fn maintain_horizontal_ground_velocity(&mut self) {
        if self.velocity.y != 0.0 {
            if self.config.maintain_horizontal_ground_velocity {
                self.velocity.y = 0.0;
            } else {
                let speed = self.velocity.length();
                let flat = Vec3::new(self.velocity.x, 0.0, self.velocity.z).normalize_or_zero();
                self.velocity = flat * speed;
            }
        }
    }

    /// Lateral acceleration available while falling.
    pub(crate) fn falling_lateral_acceleration(&self) -> Vec3 {
        let mut fall_acceleration = Vec3::new(self.acceleration.x, 0.0, self.acceleration.z);
        if fall_acceleration.length_squared() > 0.0 {
            fall_acceleration *= self.boosted_air_control();
            fall_acceleration = fall_acceleration.clamp_length_max(self.config.max_acceleration);
        }
        fall_acceleration
    }

    /// Air control, boosted when moving slowly so a standing jump can still steer.
    fn boosted_air_control(&self) -> f32 {
        let air_control = self.config.air_control;
        if air_control == 0.0 {
            return 0.0;
        }
        let threshold = self.config.air_control_boost_velocity_threshold;
        let lateral_speed_sq = self.velocity.x * self.velocity.x + self.velocity.z * self.velocity.z;
        if self.config.air_control_boost_multiplier > 0.0 && lateral_speed_sq < threshold * threshold {
            (self.config.air_control_boost_multiplier * air_control).min(1.0)
        } else {
            air_control
        }
    }

    /// Apply gravity for `dt` and clamp to terminal velocity.
    pub(crate) fn new_fall_velocity(&self, initial: Vec3, gravity: Vec3, dt: f32) -> Vec3 {
        let mut result = initial;
        if dt > 0.0 {
            result += gravity * dt;

            let terminal = self.config.terminal_velocity.abs();
            if result.length_squared() > terminal * terminal {
                let gravity_dir = gravity.normalize_or_zero();
                if result.dot(gravity_dir) > terminal {
                    result = result - gravity_dir * result.dot(gravity_dir) + gravity_dir * terminal;
                }
            }
        }
        result
    }

    pub(crate) fn snap_tiny_lateral_velocity(&mut self) {
        let lateral_sq = self.velocity.x * self.velocity.x + self.velocity.z * self.velocity.z;
        if lateral_sq <= LATERAL_SNAP_SPEED_SQ {
            self.velocity.x = 0.0;
            self.velocity.z = 0.0;
        }
    }
}
