//! # Arm command definitions
//!
//! The command set accepted by the console and by motion scripts. Commands
//! derive both `StructOpt`, for line-oriented parsing, and serde, so scripts
//! can carry them as JSON.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use structopt::StructOpt;
use thiserror::Error;

use crate::joints::JointId;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Demanded output angles, keyed by joint.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct JointDems {
    /// The demanded absolute output angle of each joint.
    ///
    /// Units: degrees
    pub pos_deg: HashMap<JointId, f64>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// A command that can be executed against the arm.
#[derive(Debug, Clone, Serialize, Deserialize, StructOpt)]
pub enum ArmCmd {
    /// A generic rotational command.
    ///
    /// Rotates each named joint to the demanded absolute output angle.
    #[structopt(name = "rot")]
    Rotation {
        #[structopt(skip)]
        dems: JointDems,
    },

    /// Jog a single joint by a delta angle.
    #[structopt(name = "jog")]
    Jog {
        /// The joint to jog.
        joint: JointId,

        /// The angle to jog by in degrees.
        ///
        /// Positive angles follow the right hand rule about the joint axis.
        #[structopt(allow_hyphen_values = true)]
        delta_deg: f64,
    },

    /// Move the tool tip to a planar target.
    ///
    /// The target is solved by the analytic planar solver and the resulting
    /// joint angles are demanded.
    #[structopt(name = "ik")]
    InverseKinematics {
        /// Horizontal distance of the tool tip from the base axis.
        ///
        /// Units: meters
        #[structopt(allow_hyphen_values = true)]
        x_m: f64,

        /// Height of the tool tip above the shoulder axis.
        ///
        /// Units: meters
        #[structopt(allow_hyphen_values = true)]
        y_m: f64,

        /// Tool orientation in the arm plane.
        ///
        /// Units: radians
        #[structopt(allow_hyphen_values = true)]
        phi_rad: f64,
    },

    /// Drive a single joint continuously (wheel mode).
    #[structopt(name = "wheel")]
    Wheel {
        /// The joint to drive.
        joint: JointId,

        /// Demanded speed in ticks/second, negative to reverse.
        #[structopt(allow_hyphen_values = true)]
        speed: i32,
    },

    /// Send every joint back to its zero position and wait for it.
    #[structopt(name = "zero")]
    Zero,

    /// Show tracked positions and servo status for every joint.
    #[structopt(name = "info")]
    Info,

    /// Stop the arm, holding position and zeroing all speed demands.
    #[structopt(name = "stop")]
    Stop,
}

/// Possible parsing errors.
#[derive(Debug, Error)]
pub enum CmdParseError {
    #[error("Command contains invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ArmCmd {
    /// Parse a command from a JSON packet.
    pub fn from_json(json_str: &str) -> Result<Self, CmdParseError> {
        Ok(serde_json::from_str(json_str)?)
    }

    /// Serialise a command to JSON.
    pub fn to_json(&self) -> Result<String, CmdParseError> {
        Ok(serde_json::to_string(self)?)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_json_roundtrip() {
        let cmd = ArmCmd::Jog {
            joint: JointId::Elbow,
            delta_deg: -10.0,
        };

        let json = cmd.to_json().unwrap();
        match ArmCmd::from_json(&json).unwrap() {
            ArmCmd::Jog { joint, delta_deg } => {
                assert_eq!(joint, JointId::Elbow);
                assert!((delta_deg + 10.0).abs() < 1e-12);
            }
            other => panic!("roundtrip changed the command: {:?}", other),
        }
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(ArmCmd::from_json("not json at all").is_err());
        assert!(ArmCmd::from_json("{\"Teleport\": null}").is_err());
    }

    #[test]
    fn test_rotation_dems_keys() {
        let mut dems = JointDems::default();
        dems.pos_deg.insert(JointId::Base, 15.0);
        dems.pos_deg.insert(JointId::Shoulder, 67.7);

        let cmd = ArmCmd::Rotation { dems };
        let json = cmd.to_json().unwrap();

        // Joint keys serialise as names so scripts stay hand-editable
        assert!(json.contains("Base"));
        assert!(json.contains("Shoulder"));
    }
}
