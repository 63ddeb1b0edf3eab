//! Movement configuration and tolerances.
//!
//! All movement parameters are grouped here for easy tuning. Values use
//! metres and seconds.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Tolerances
// ============================================================================

/// Lower bound of the rest distance between capsule and floor.
pub const MIN_FLOOR_DIST: f32 = 0.019;

/// Upper bound of the rest distance between capsule and floor.
pub const MAX_FLOOR_DIST: f32 = 0.024;

/// Hits closer than this to the capsule's radius are treated as side hits.
pub const SWEEP_EDGE_REJECT_DISTANCE: f32 = 0.0015;

/// Braking snaps speeds below this to zero.
pub const BRAKE_TO_STOP_VELOCITY: f32 = 0.1;

/// Shortest time slice worth simulating.
pub const MIN_TICK_TIME: f32 = 1.0e-6;

/// Generic small number for normal components and time fractions.
pub const KINDA_SMALL_NUMBER: f32 = 1.0e-4;

/// Step sides steeper than this (normal Y) count as real steps.
pub const MAX_STEP_SIDE_Y: f32 = 0.08;

/// Contact normals with Y above this are not vertical walls.
pub const VERTICAL_SLOPE_NORMAL_Y: f32 = 0.001;

/// Minimum distance a sweep backs off from the surface it hit.
pub const PULLBACK_DISTANCE: f32 = 0.001;

/// Extra push applied when moving out of penetration.
pub const PENETRATION_PULLBACK: f32 = 0.00125;

/// Overlap inflation used to validate a depenetration target.
pub const PENETRATION_OVERLAP_INFLATION: f32 = 0.001;

/// Default walkable slope, in degrees.
pub const DEFAULT_WALKABLE_FLOOR_ANGLE: f32 = 44.765;

// ============================================================================
// Errors
// ============================================================================

/// Errors raised while loading or validating a [`MovementConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue {
        field: &'static str,
        reason: &'static str,
    },

    #[error("failed to parse movement config: {0}")]
    Parse(#[from] serde_json::Error),
}

// ============================================================================
// Owner-supplied speeds
// ============================================================================

/// Per-mode maximum speeds, supplied by the owning unit every tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedTable {
    /// Ground speed, also the lateral cap while falling (metres/second).
    pub run: f32,
    /// Swimming speed (metres/second).
    pub swim: f32,
    /// Flying speed (metres/second).
    pub flight: f32,
}

impl Default for SpeedTable {
    fn default() -> Self {
        Self {
            run: 6.0,
            swim: 3.0,
            flight: 6.0,
        }
    }
}

/// What to do when a unit stays overlapping geometry after every
/// depenetration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StuckPolicy {
    /// Teleport back to the last location that overlapped nothing and stop.
    #[default]
    RevertToLastValid,
    /// Keep the overlap for this tick and try again next tick.
    AcceptOverlap,
}

// ============================================================================
// Config
// ============================================================================

/// Configuration for unit movement physics.
///
/// All values use metric units (meters, seconds) unless otherwise noted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    // ========================================================================
    // Acceleration and braking
    // ========================================================================
    /// Maximum input acceleration (metres/second²).
    pub max_acceleration: f32,

    /// Deceleration without input while walking (metres/second²).
    pub braking_deceleration_walking: f32,

    /// Lateral deceleration without input while falling.
    pub braking_deceleration_falling: f32,

    /// Deceleration without input while swimming.
    pub braking_deceleration_swimming: f32,

    /// Deceleration without input while flying.
    pub braking_deceleration_flying: f32,

    /// Ground friction. Higher values turn and stop faster.
    pub ground_friction: f32,

    /// Multiplier applied to friction while braking.
    pub braking_friction_factor: f32,

    /// Friction used while braking when `use_separate_braking_friction` is set.
    pub braking_friction: f32,

    /// Use `braking_friction` instead of the mode's friction when braking.
    pub use_separate_braking_friction: bool,

    /// Longest braking integration step (seconds), clamped to [1/75, 1/20].
    pub braking_sub_step_time: f32,

    /// Friction of the surrounding fluid while swimming or flying.
    pub fluid_friction: f32,

    /// Analog input never asks for less than this speed while grounded or falling.
    pub min_analog_walk_speed: f32,

    // ========================================================================
    // Floor
    // ========================================================================
    /// Steepest walkable slope in degrees, within [0, 90].
    walkable_floor_angle: f32,

    /// Tallest step a walking unit climbs (metres).
    pub max_step_height: f32,

    /// Re-run the floor check even when the unit did not move.
    pub always_check_floor: bool,

    /// Ledge overhang tolerated before the perch probe runs (metres). 0 disables perching.
    pub perch_radius_threshold: f32,

    /// Extra floor search height while perching on a ledge (metres).
    pub perch_additional_height: f32,

    /// Floor height corrections larger than this count as teleports (metres).
    pub floor_snap_teleport_threshold: f32,

    /// Keep ground speed horizontal on ramps.
    pub maintain_horizontal_ground_velocity: bool,

    /// Units may walk off ledges. When false they stop or slide along the edge.
    pub can_walk_off_ledges: bool,

    /// Extra drop depth accepted when probing for a sideways ledge move (metres).
    pub ledge_check_threshold: f32,

    // ========================================================================
    // Falling and jumping
    // ========================================================================
    /// Gravity acceleration, a positive number (metres/second²).
    pub gravity: f32,

    /// Per-unit gravity multiplier.
    pub gravity_scale: f32,

    /// Fall speed limit along gravity (metres/second).
    pub terminal_velocity: f32,

    /// Fraction of lateral control while airborne (0.0 = none, 1.0 = full).
    pub air_control: f32,

    /// Air control multiplier below `air_control_boost_velocity_threshold`.
    pub air_control_boost_multiplier: f32,

    /// Lateral speed under which air control is boosted (metres/second).
    pub air_control_boost_velocity_threshold: f32,

    /// Lateral friction while falling.
    pub falling_lateral_friction: f32,

    /// Upward velocity applied by a jump (metres/second).
    pub jump_y_velocity: f32,

    /// Jumps allowed before landing.
    pub jump_max_count: u32,

    /// Holding jump keeps applying jump velocity for up to this long (seconds).
    pub jump_max_hold_time: f32,

    /// Apply gravity while the jump is still held.
    pub apply_gravity_while_jumping: bool,

    /// Fraction of gravity cancelled while swimming.
    pub buoyancy: f32,

    // ========================================================================
    // Simulation
    // ========================================================================
    /// Longest simulation sub-step (seconds).
    pub max_simulation_time_step: f32,

    /// Sub-steps allowed per tick. Leftover time is dropped.
    pub max_simulation_iterations: u32,

    /// Apex sub-steps allowed per tick.
    pub max_jump_apex_attempts: u32,

    /// Largest distance a depenetration may move the unit (metres).
    pub max_depenetration: f32,

    /// Recovery when depenetration fails.
    pub stuck_policy: StuckPolicy,
}

impl Default for MovementConfig {
    fn default() -> Self {
        let walkable_floor_angle = DEFAULT_WALKABLE_FLOOR_ANGLE;
        Self {
            max_acceleration: 20.48,
            braking_deceleration_walking: 20.48,
            braking_deceleration_falling: 0.0,
            braking_deceleration_swimming: 1.0,
            braking_deceleration_flying: 0.0,
            ground_friction: 8.0,
            braking_friction_factor: 2.0,
            braking_friction: 0.0,
            use_separate_braking_friction: false,
            braking_sub_step_time: 1.0 / 33.0,
            fluid_friction: 0.3,
            min_analog_walk_speed: 0.0,

            walkable_floor_angle,
            max_step_height: 0.45,
            always_check_floor: true,
            perch_radius_threshold: 0.0,
            perch_additional_height: 0.4,
            floor_snap_teleport_threshold: 0.05,
            maintain_horizontal_ground_velocity: true,
            can_walk_off_ledges: true,
            ledge_check_threshold: 0.04,

            gravity: 9.81,
            gravity_scale: 1.0,
            terminal_velocity: 40.0,
            air_control: 0.05,
            air_control_boost_multiplier: 2.0,
            air_control_boost_velocity_threshold: 0.25,
            falling_lateral_friction: 0.0,
            jump_y_velocity: 4.2,
            jump_max_count: 1,
            jump_max_hold_time: 0.0,
            apply_gravity_while_jumping: true,
            buoyancy: 1.0,

            max_simulation_time_step: 0.05,
            max_simulation_iterations: 8,
            max_jump_apex_attempts: 2,
            max_depenetration: 1.0,
            stuck_policy: StuckPolicy::RevertToLastValid,
        }
    }
}

impl MovementConfig {
    /// Create a "fast arcade" movement config: snappy turns, strong air control.
    pub fn arcade() -> Self {
        Self {
            max_acceleration: 40.0,
            braking_deceleration_walking: 40.0,
            ground_friction: 10.0,
            gravity_scale: 1.5,
            air_control: 0.35,
            jump_y_velocity: 6.0,
            jump_max_count: 2,
            jump_max_hold_time: 0.2,
            perch_radius_threshold: 0.1,
            ..Default::default()
        }
    }

    /// Create a "heavy" movement config: slow to start and stop, no air control.
    pub fn heavy() -> Self {
        let mut config = Self {
            max_acceleration: 8.0,
            braking_deceleration_walking: 6.0,
            ground_friction: 4.0,
            air_control: 0.0,
            jump_y_velocity: 3.0,
            max_step_height: 0.3,
            can_walk_off_ledges: false,
            ..Default::default()
        };
        config.set_walkable_floor_angle(35.0);
        config
    }

    /// Parse a JSON config. Missing fields take their default values.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every value is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn non_negative(field: &'static str, value: f32) -> Result<(), ConfigError> {
            if value.is_finite() && value >= 0.0 {
                Ok(())
            } else {
                Err(ConfigError::InvalidValue {
                    field,
                    reason: "must be a finite, non-negative number",
                })
            }
        }

        non_negative("max_acceleration", self.max_acceleration)?;
        non_negative("braking_deceleration_walking", self.braking_deceleration_walking)?;
        non_negative("braking_deceleration_falling", self.braking_deceleration_falling)?;
        non_negative("braking_deceleration_swimming", self.braking_deceleration_swimming)?;
        non_negative("braking_deceleration_flying", self.braking_deceleration_flying)?;
        non_negative("ground_friction", self.ground_friction)?;
        non_negative("braking_friction_factor", self.braking_friction_factor)?;
        non_negative("braking_friction", self.braking_friction)?;
        non_negative("fluid_friction", self.fluid_friction)?;
        non_negative("max_step_height", self.max_step_height)?;
        non_negative("perch_radius_threshold", self.perch_radius_threshold)?;
        non_negative("perch_additional_height", self.perch_additional_height)?;
        non_negative("gravity", self.gravity)?;
        non_negative("terminal_velocity", self.terminal_velocity)?;
        non_negative("air_control", self.air_control)?;
        non_negative("jump_y_velocity", self.jump_y_velocity)?;
        non_negative("jump_max_hold_time", self.jump_max_hold_time)?;
        non_negative("max_depenetration", self.max_depenetration)?;

        if !(0.0..=90.0).contains(&self.walkable_floor_angle) {
            return Err(ConfigError::InvalidValue {
                field: "walkable_floor_angle",
                reason: "must be between 0 and 90 degrees",
            });
        }
        if !(self.max_simulation_time_step > 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "max_simulation_time_step",
                reason: "must be positive",
            });
        }
        if self.max_simulation_iterations == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_simulation_iterations",
                reason: "must allow at least one iteration",
            });
        }
        Ok(())
    }

    /// Steepest walkable slope in degrees.
    #[inline]
    pub fn walkable_floor_angle(&self) -> f32 {
        self.walkable_floor_angle
    }

    /// Minimum impact normal Y of a walkable surface.
    #[inline]
    pub fn walkable_floor_y(&self) -> f32 {
        self.walkable_floor_angle.to_radians().cos()
    }

    /// Set the walkable slope in degrees.
    pub fn set_walkable_floor_angle(&mut self, degrees: f32) {
        self.walkable_floor_angle = degrees.clamp(0.0, 90.0);
    }

    /// Set the walkable slope by its cosine.
    pub fn set_walkable_floor_y(&mut self, y: f32) {
        self.walkable_floor_angle = y.clamp(0.0, 1.0).acos().to_degrees();
    }

    /// Gravity along Y, negative.
    #[inline]
    pub fn gravity_y(&self) -> f32 {
        -self.gravity * self.gravity_scale
    }

    /// Perch threshold with negatives treated as zero.
    #[inline]
    pub fn perch_radius_threshold(&self) -> f32 {
        self.perch_radius_threshold.max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MovementConfig::default();
        assert!(config.max_acceleration > 0.0);
        assert!(config.gravity > 0.0);
        assert!(config.validate().is_ok());
        assert!((config.walkable_floor_y() - 0.71).abs() < 0.01);
    }

    #[test]
    fn test_presets_validate() {
        assert!(MovementConfig::arcade().validate().is_ok());
        let heavy = MovementConfig::heavy();
        assert!(heavy.validate().is_ok());
        assert!((heavy.walkable_floor_y() - 35.0_f32.to_radians().cos()).abs() < 1e-6);
    }

    #[test]
    fn test_walkable_angle_and_y_stay_in_sync() {
        let mut config = MovementConfig::default();

        config.set_walkable_floor_angle(60.0);
        assert!((config.walkable_floor_y() - 0.5).abs() < 1e-5);

        config.set_walkable_floor_y(1.0);
        assert!(config.walkable_floor_angle().abs() < 1e-3);

        config.set_walkable_floor_angle(120.0);
        assert_eq!(config.walkable_floor_angle(), 90.0);
    }

    #[test]
    fn test_json_partial_config() {
        let config = MovementConfig::from_json_str(
            r#"{ "max_step_height": 0.5, "walkable_floor_angle": 30.0, "stuck_policy": "AcceptOverlap" }"#,
        )
        .unwrap();

        assert_eq!(config.max_step_height, 0.5);
        assert_eq!(config.stuck_policy, StuckPolicy::AcceptOverlap);
        assert!((config.walkable_floor_y() - 30.0_f32.to_radians().cos()).abs() < 1e-6);
        // Untouched fields keep their defaults.
        assert_eq!(config.jump_max_count, 1);
    }

    #[test]
    fn test_json_rejects_bad_values() {
        let err = MovementConfig::from_json_str(r#"{ "gravity": -3.0 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "gravity", .. }));

        let err = MovementConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
