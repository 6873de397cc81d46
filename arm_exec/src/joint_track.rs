//! Multi-turn absolute position tracking
//!
//! The servo's absolute count register wraps at 16 bits, so a joint that
//! turns far enough loses its history. The tracker reconstructs an unbounded
//! absolute step count by accumulating wrap-aware deltas between consecutive
//! readings, seeded from an operator-supplied whole-turn count at startup.
//!
//! The tracker stays correct as long as the joint moves less than half a
//! register span (32768 ticks, eight motor turns) between polls.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Serialize;

// Internal
use servo_if::joints::TICKS_PER_TURN;
use util::maths::wrap_delta_u16;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Tracks the unbounded absolute step count of one joint.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MultiTurnTracker {
    /// The last raw register reading folded into the count.
    last_raw: u16,

    /// The reconstructed absolute step count.
    abs_steps: i64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl MultiTurnTracker {
    /// Seed a tracker from an initial register reading and the number of
    /// whole turns the joint has already made from its zero position.
    pub fn new(initial_raw: u16, initial_turns: i64) -> Self {
        Self {
            last_raw: initial_raw,
            abs_steps: initial_turns * TICKS_PER_TURN + (initial_raw as i64 % TICKS_PER_TURN),
        }
    }

    /// Fold a new raw register reading into the absolute count.
    ///
    /// Returns the updated absolute step count.
    pub fn update(&mut self, raw: u16) -> i64 {
        let delta = wrap_delta_u16(self.last_raw, raw);
        self.abs_steps += delta as i64;
        self.last_raw = raw;
        self.abs_steps
    }

    /// The reconstructed absolute step count.
    pub fn abs_steps(&self) -> i64 {
        self.abs_steps
    }

    /// The whole-turn count of the motor (floor of the absolute count).
    pub fn turns(&self) -> i64 {
        self.abs_steps.div_euclid(TICKS_PER_TURN)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_seeding() {
        let tracker = MultiTurnTracker::new(100, 0);
        assert_eq!(tracker.abs_steps(), 100);
        assert_eq!(tracker.turns(), 0);

        // A joint already two turns from zero
        let tracker = MultiTurnTracker::new(100, 2);
        assert_eq!(tracker.abs_steps(), 2 * TICKS_PER_TURN + 100);
        assert_eq!(tracker.turns(), 2);

        // Negative seeds work the same way
        let tracker = MultiTurnTracker::new(100, -1);
        assert_eq!(tracker.abs_steps(), -TICKS_PER_TURN + 100);
        assert_eq!(tracker.turns(), -1);
    }

    #[test]
    fn test_forward_wrap() {
        let mut tracker = MultiTurnTracker::new(0xFFF0, 15);

        // Crossing the 16 bit boundary must not lose the accumulated turns
        let abs = tracker.update(0x0010);
        assert_eq!(abs, 15 * TICKS_PER_TURN + (0xFFF0 % TICKS_PER_TURN as u16) as i64 + 0x20);
    }

    #[test]
    fn test_backward_wrap() {
        let mut tracker = MultiTurnTracker::new(0x0010, 0);
        tracker.update(0xFFF0);
        assert_eq!(tracker.abs_steps(), 0x10 - 0x20);
        assert_eq!(tracker.turns(), -1);
    }

    #[test]
    fn test_monotone_over_many_wraps() {
        let mut tracker = MultiTurnTracker::new(0, 0);
        let mut raw = 0u16;
        let mut last_abs = tracker.abs_steps();

        // March forwards in large steps through several full wraps
        for _ in 0..100 {
            raw = raw.wrapping_add(20_000);
            let abs = tracker.update(raw);
            assert!(abs > last_abs);
            last_abs = abs;
        }
        assert_eq!(last_abs, 100 * 20_000);

        // And all the way back down
        for _ in 0..100 {
            raw = raw.wrapping_sub(20_000);
            last_abs = tracker.update(raw);
        }
        assert_eq!(last_abs, 0);
        assert_eq!(tracker.turns(), 0);
    }

    #[test]
    fn test_turn_count_tracks_motor_turns() {
        let mut tracker = MultiTurnTracker::new(0, 0);

        let mut raw = 0u16;
        for _ in 0..3 {
            // One full motor turn in four quarter steps
            for _ in 0..4 {
                raw = raw.wrapping_add(TICKS_PER_TURN as u16 / 4);
                tracker.update(raw);
            }
        }

        assert_eq!(tracker.turns(), 3);
    }
}
