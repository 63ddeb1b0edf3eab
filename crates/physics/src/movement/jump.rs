//! Jump state management.
//!
//! Tracks the jump button, how long it has been held, how much of the
//! sustained jump force is left, and how many jumps happened since the
//! unit last stood on the ground. The movement component drives it twice
//! per tick: once before physics (to start a jump) and once after (to age
//! the held button).

use serde::{Deserialize, Serialize};

/// Jump state machine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JumpState {
    /// Jump button is held.
    pressed: bool,

    /// A jump was started or sustained during the last check.
    was_jumping: bool,

    /// How long the button has been held (seconds).
    key_hold_time: f32,

    /// Sustained jump force left (seconds).
    force_time_remaining: f32,

    /// Jumps since the unit last stood on the ground.
    current_count: u32,

    /// `current_count` before this tick's jump check.
    count_before_jump: u32,
}

impl JumpState {
    /// Create a new jump state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Press the jump button.
    pub fn press(&mut self) {
        self.pressed = true;
        self.key_hold_time = 0.0;
    }

    /// Whether the jump button is held.
    #[inline]
    pub fn is_pressed(&self) -> bool {
        self.pressed
    }

    /// Whether the last jump check started or sustained a jump.
    #[inline]
    pub fn was_jumping(&self) -> bool {
        self.was_jumping
    }

    /// Jumps since the unit last stood on the ground.
    #[inline]
    pub fn current_count(&self) -> u32 {
        self.current_count
    }

    /// Jump count before this tick's jump check.
    #[inline]
    pub fn count_before_jump(&self) -> u32 {
        self.count_before_jump
    }

    /// How long the button has been held.
    #[inline]
    pub fn key_hold_time(&self) -> f32 {
        self.key_hold_time
    }

    /// Sustained jump force left.
    #[inline]
    pub fn force_time_remaining(&self) -> f32 {
        self.force_time_remaining
    }

    /// Count and hold rules for starting or sustaining a jump.
    ///
    /// A first jump taken while already falling counts as the second jump,
    /// so a single-jump unit cannot jump after walking off a ledge.
    pub fn allows_jump(&self, falling: bool, max_count: u32, max_hold_time: f32) -> bool {
        if !self.was_jumping || max_hold_time <= 0.0 {
            if self.current_count == 0 && falling {
                self.current_count + 1 < max_count
            } else {
                self.current_count < max_count
            }
        } else {
            // Sustaining a held jump.
            self.pressed
                && self.key_hold_time < max_hold_time
                && (self.current_count < max_count
                    || (self.was_jumping && self.current_count == max_count))
        }
    }

    /// Start of the jump check. Returns true if the button is held.
    ///
    /// A first press while already falling consumes one jump.
    pub(crate) fn begin_check(&mut self, falling: bool) -> bool {
        self.count_before_jump = self.current_count;
        if self.pressed && self.current_count == 0 && falling {
            self.current_count += 1;
        }
        self.pressed
    }

    /// End of the jump check. Returns the new jump count when a fresh jump started.
    pub(crate) fn finish_check(&mut self, did_jump: bool, max_hold_time: f32) -> Option<u32> {
        let started = did_jump && !self.was_jumping;
        if started {
            self.current_count += 1;
            self.force_time_remaining = max_hold_time;
        }
        self.was_jumping = did_jump;
        started.then_some(self.current_count)
    }

    /// Age the held button after physics ran.
    pub(crate) fn clear_input(&mut self, dt: f32, max_hold_time: f32) {
        if self.pressed {
            self.key_hold_time += dt;
            if self.key_hold_time >= max_hold_time {
                self.pressed = false;
            }
        } else {
            self.force_time_remaining = 0.0;
            self.was_jumping = false;
        }
    }

    /// Consume sustained jump force for one falling sub-step.
    ///
    /// Returns the time gravity applies to, and whether the force ran out.
    pub(crate) fn consume_force(&mut self, dt: f32, apply_gravity_while_jumping: bool) -> (f32, bool) {
        if self.force_time_remaining <= 0.0 {
            return (dt, false);
        }
        let force_time = self.force_time_remaining.min(dt);
        let gravity_time = if apply_gravity_while_jumping {
            dt
        } else {
            (dt - force_time).max(0.0)
        };
        self.force_time_remaining -= force_time;
        (gravity_time, self.force_time_remaining <= 0.0)
    }

    /// Release the button and drop any jump in progress.
    ///
    /// The jump count survives while the unit is still falling.
    pub fn reset(&mut self, falling: bool) {
        self.pressed = false;
        self.was_jumping = false;
        self.key_hold_time = 0.0;
        self.force_time_remaining = 0.0;
        if !falling {
            self.current_count = 0;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
