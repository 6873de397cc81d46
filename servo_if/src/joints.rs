//! # Joint definitions
//!
//! Names the joints of the arm and carries the per-joint configuration
//! needed to convert between output angles and motor step counts.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Motor encoder ticks per motor turn.
pub const TICKS_PER_TURN: i64 = 4096;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// IDs of all joints on the arm.
#[derive(Serialize, Deserialize, Debug, Hash, Eq, PartialEq, Copy, Clone)]
pub enum JointId {
    Base,
    Shoulder,
    Elbow,
    Wrist,
    Roll,
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Static configuration of a single joint.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct JointConfig {
    /// Bus ID of the servo driving this joint.
    pub servo_id: u8,

    /// Gearbox ratio between motor turns and output turns.
    pub gear_ratio: f64,

    /// Output angle at the motor's zero step position.
    ///
    /// Units: degrees
    pub starting_angle_deg: f64,

    /// Demanded move speed.
    ///
    /// Units: ticks/second
    pub speed: u16,

    /// Demanded acceleration.
    ///
    /// Units: 100 ticks/second^2
    pub acc: u8,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl fmt::Display for JointId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            JointId::Base => "base",
            JointId::Shoulder => "shoulder",
            JointId::Elbow => "elbow",
            JointId::Wrist => "wrist",
            JointId::Roll => "roll",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for JointId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "base" => Ok(JointId::Base),
            "shoulder" => Ok(JointId::Shoulder),
            "elbow" => Ok(JointId::Elbow),
            "wrist" => Ok(JointId::Wrist),
            "roll" => Ok(JointId::Roll),
            other => Err(format!("{} is not a recognised joint name", other)),
        }
    }
}

impl JointConfig {
    /// Motor steps per output degree for this joint.
    pub fn steps_per_degree(&self) -> f64 {
        TICKS_PER_TURN as f64 * self.gear_ratio / 360.0
    }

    /// Convert an absolute output angle into a motor step count, relative to
    /// the starting angle.
    pub fn angle_to_steps(&self, angle_deg: f64) -> i64 {
        ((angle_deg - self.starting_angle_deg) * self.steps_per_degree()).round() as i64
    }

    /// Convert a motor step count back into an absolute output angle.
    pub fn steps_to_angle(&self, steps: i64) -> f64 {
        self.starting_angle_deg + steps as f64 / self.steps_per_degree()
    }

    /// Convert an angle delta into a step delta.
    pub fn angle_delta_to_steps(&self, delta_deg: f64) -> i64 {
        (delta_deg * self.steps_per_degree()).round() as i64
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn config(gear: f64, start: f64) -> JointConfig {
        JointConfig {
            servo_id: 1,
            gear_ratio: gear,
            starting_angle_deg: start,
            speed: 1200,
            acc: 50,
        }
    }

    #[test]
    fn test_angle_step_conversion() {
        // 20:1 gearbox means 18 output degrees per motor turn
        let cfg = config(20.0, 0.0);
        assert_eq!(cfg.angle_to_steps(18.0), TICKS_PER_TURN);
        assert_eq!(cfg.angle_to_steps(-18.0), -TICKS_PER_TURN);
        assert!((cfg.steps_to_angle(TICKS_PER_TURN) - 18.0).abs() < 1e-9);

        // Starting angle offsets the zero
        let cfg = config(20.0, 67.7);
        assert_eq!(cfg.angle_to_steps(67.7), 0);
        assert!((cfg.steps_to_angle(0) - 67.7).abs() < 1e-9);
    }

    #[test]
    fn test_direct_drive_joint() {
        let cfg = config(1.0, 0.0);
        assert_eq!(cfg.angle_to_steps(360.0), TICKS_PER_TURN);
        assert_eq!(cfg.angle_delta_to_steps(90.0), TICKS_PER_TURN / 4);
    }

    #[test]
    fn test_joint_id_from_str() {
        assert_eq!(JointId::from_str("base").unwrap(), JointId::Base);
        assert_eq!(JointId::from_str("Wrist").unwrap(), JointId::Wrist);
        assert!(JointId::from_str("knee").is_err());
    }
}
