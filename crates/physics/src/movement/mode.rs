//! Movement modes and the events emitted when they change.

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Physics mode of a unit. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MovementMode {
    /// No movement is simulated.
    None,
    /// On a walkable floor.
    #[default]
    Walking,
    /// Airborne, under gravity.
    Falling,
    /// In a fluid, under buoyancy.
    Swimming,
    /// Free flight, no gravity.
    Flying,
}

impl MovementMode {
    /// Modes in which input may accelerate the unit vertically.
    #[inline]
    pub fn allows_vertical_input(self) -> bool {
        matches!(self, MovementMode::Swimming | MovementMode::Flying)
    }
}

impl std::fmt::Display for MovementMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MovementMode::None => "none",
            MovementMode::Walking => "walking",
            MovementMode::Falling => "falling",
            MovementMode::Swimming => "swimming",
            MovementMode::Flying => "flying",
        };
        f.write_str(name)
    }
}

/// Gameplay-relevant movement events, delivered to the owning unit.
///
/// The owner decides what (if anything) to send over the network.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MovementEvent {
    /// The active mode changed.
    ModeChanged { from: MovementMode, to: MovementMode },
    /// The unit left the ground (first frame of falling).
    FallStarted { location: Vec3 },
    /// The unit touched down on a walkable surface.
    Landed { location: Vec3, impact_velocity: Vec3 },
    /// A jump was started.
    Jumped { count: u32 },
    /// The unit could not be pushed out of geometry.
    StuckInGeometry { location: Vec3 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertical_input_modes() {
        assert!(MovementMode::Flying.allows_vertical_input());
        assert!(MovementMode::Swimming.allows_vertical_input());
        assert!(!MovementMode::Walking.allows_vertical_input());
        assert!(!MovementMode::Falling.allows_vertical_input());
        assert!(!MovementMode::None.allows_vertical_input());
    }

    #[test]
    fn test_mode_display() {
        assert_eq!(MovementMode::Falling.to_string(), "falling");
        assert_eq!(MovementMode::default(), MovementMode::Walking);
    }
}
