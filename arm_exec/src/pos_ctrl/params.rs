//! Parameters structure for PosCtrl

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;
use std::collections::HashMap;

use arm_kin::planar::PlanarArm;
use servo_if::joints::{JointConfig, JointId};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for position control.
#[derive(Debug, Default, Deserialize)]
pub struct Params {
    /// Configuration of every controlled joint.
    pub joints: HashMap<JointId, JointConfig>,

    /// Whole turns each joint has already made from zero at startup.
    ///
    /// Joints not listed start at zero turns.
    #[serde(default)]
    pub initial_turns: HashMap<JointId, i64>,

    /// Geometry of the planar chain, used to resolve IK targets into joint
    /// angles.
    pub planar_geom: Option<PlanarArm>,
}
