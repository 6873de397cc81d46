//! Key bindings for the teleoperation loops
//!
//! Both the position teleop in the main executable and the wheel teleop
//! binary share one keymap: paired keys jog a joint in each direction, with a
//! handful of control keys alongside. Input is line-oriented, so each entered
//! line's first character selects the action.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use servo_if::joints::JointId;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// An action requested from the teleop key loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TeleopAction {
    /// Jog a joint. `dir` is +1.0 or -1.0; the loop scales it by its
    /// configured jog step.
    Jog { joint: JointId, dir: f64 },

    /// Show tracked positions and servo status.
    Info,

    /// Dump the full register table of every servo.
    DumpRegisters,

    /// Drive every joint back to its zero position.
    Zero,

    /// Stop all motion.
    StopAll,

    /// Leave the teleop loop.
    Quit,
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Map a key to a teleop action.
///
/// Key pairs run down the rows of the keyboard, one pair per joint: q/a base,
/// w/s shoulder, e/d elbow, r/f wrist, t/g roll.
pub fn action_for_key(key: char) -> Option<TeleopAction> {
    let jog = |joint, dir| Some(TeleopAction::Jog { joint, dir });

    match key.to_ascii_lowercase() {
        'q' => jog(JointId::Base, 1.0),
        'a' => jog(JointId::Base, -1.0),
        'w' => jog(JointId::Shoulder, 1.0),
        's' => jog(JointId::Shoulder, -1.0),
        'e' => jog(JointId::Elbow, 1.0),
        'd' => jog(JointId::Elbow, -1.0),
        'r' => jog(JointId::Wrist, 1.0),
        'f' => jog(JointId::Wrist, -1.0),
        't' => jog(JointId::Roll, 1.0),
        'g' => jog(JointId::Roll, -1.0),
        'i' => Some(TeleopAction::DumpRegisters),
        'p' => Some(TeleopAction::Info),
        '-' => Some(TeleopAction::Zero),
        ' ' => Some(TeleopAction::StopAll),
        'x' | '\x1b' => Some(TeleopAction::Quit),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_jog_pairs() {
        for (up, down, joint) in &[
            ('q', 'a', JointId::Base),
            ('w', 's', JointId::Shoulder),
            ('e', 'd', JointId::Elbow),
            ('r', 'f', JointId::Wrist),
            ('t', 'g', JointId::Roll),
        ] {
            assert_eq!(
                action_for_key(*up),
                Some(TeleopAction::Jog {
                    joint: *joint,
                    dir: 1.0
                })
            );
            assert_eq!(
                action_for_key(*down),
                Some(TeleopAction::Jog {
                    joint: *joint,
                    dir: -1.0
                })
            );
        }
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(action_for_key('Q'), action_for_key('q'));
        assert_eq!(action_for_key('S'), action_for_key('s'));
    }

    #[test]
    fn test_control_keys() {
        assert_eq!(action_for_key('p'), Some(TeleopAction::Info));
        assert_eq!(action_for_key('i'), Some(TeleopAction::DumpRegisters));
        assert_eq!(action_for_key('-'), Some(TeleopAction::Zero));
        assert_eq!(action_for_key(' '), Some(TeleopAction::StopAll));
        assert_eq!(action_for_key('x'), Some(TeleopAction::Quit));
        assert_eq!(action_for_key('\x1b'), Some(TeleopAction::Quit));
    }

    #[test]
    fn test_unknown_keys_do_nothing() {
        assert_eq!(action_for_key('z'), None);
        assert_eq!(action_for_key('7'), None);
    }
}
