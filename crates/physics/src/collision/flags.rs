//! Collision masks for filtering sweep and overlap queries.
//!
//! Every collidable registered in the broad phase carries a group mask, and
//! every query carries the mask of groups it wants to be blocked by.

use serde::{Deserialize, Serialize};

/// Bit set describing which collision groups something belongs to, or which
/// groups a query collides with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CollisionMask(pub u32);

impl CollisionMask {
    /// Matches nothing.
    pub const NONE: Self = Self(0);

    /// Static level geometry - floors, walls, stairs.
    pub const WORLD_STATIC: Self = Self(1 << 0);

    /// Geometry that can move between ticks (doors, lifts, crates).
    pub const WORLD_DYNAMIC: Self = Self(1 << 1);

    /// Other units' bodies.
    pub const UNIT: Self = Self(1 << 2);

    /// Blocks units but nothing else (invisible walls).
    pub const UNIT_CLIP: Self = Self(1 << 3);

    /// Trigger volumes. Never blocks movement.
    pub const TRIGGER: Self = Self(1 << 4);

    /// Standard mask for unit movement sweeps.
    pub const MASK_MOVEMENT: Self = Self(
        Self::WORLD_STATIC.0 | Self::WORLD_DYNAMIC.0 | Self::UNIT.0 | Self::UNIT_CLIP.0,
    );

    /// Mask for floor probes. Units are not floors.
    pub const MASK_FLOOR: Self = Self(
        Self::WORLD_STATIC.0 | Self::WORLD_DYNAMIC.0 | Self::UNIT_CLIP.0,
    );

    /// Check if these flags contain a specific flag.
    #[inline]
    pub fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Check if any of the given flags are set.
    #[inline]
    pub fn intersects(self, other: Self) -> bool {
        (self.0 & other.0) != 0
    }

    /// Combine two flag sets.
    #[inline]
    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Remove flags from this set.
    #[inline]
    pub fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }
}

impl std::ops::BitOr for CollisionMask {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitAnd for CollisionMask {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_operations() {
        let combined = CollisionMask::WORLD_STATIC | CollisionMask::UNIT;

        assert!(combined.contains(CollisionMask::WORLD_STATIC));
        assert!(combined.contains(CollisionMask::UNIT));
        assert!(!combined.contains(CollisionMask::TRIGGER));
        assert!(combined.intersects(CollisionMask::UNIT));
        assert_eq!(combined.difference(CollisionMask::UNIT), CollisionMask::WORLD_STATIC);
    }

    #[test]
    fn test_movement_mask_ignores_triggers() {
        let mask = CollisionMask::MASK_MOVEMENT;
        assert!(mask.contains(CollisionMask::WORLD_STATIC));
        assert!(mask.contains(CollisionMask::UNIT_CLIP));
        assert!(!mask.intersects(CollisionMask::TRIGGER));
        assert!(!CollisionMask::MASK_FLOOR.intersects(CollisionMask::UNIT));
    }
}
