//! Kinematics of the 5 DOF spatial chain
//!
//! Base rotation about the vertical axis, then shoulder, elbow and wrist
//! pitch in the vertical plane through the base axis, with a roll joint at
//! the tool. The inverse solution reduces to the planar 2-link problem after
//! projecting the target into the arm plane and removing the tool vector at
//! the demanded pitch.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

// Internal
use crate::planar::{PlanarArm, PlanarJoints};
use util::maths::norm_angle_pi;

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// Geometry of the spatial chain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SpatialArm {
    /// Base to shoulder height.
    ///
    /// Units: meters
    pub base_height_m: f64,

    /// Shoulder to elbow length.
    ///
    /// Units: meters
    pub upper_arm_m: f64,

    /// Elbow to wrist length.
    ///
    /// Units: meters
    pub forearm_m: f64,

    /// Wrist to tool tip length.
    ///
    /// Units: meters
    pub tool_m: f64,
}

/// A joint-space solution for the spatial chain.
///
/// All angles are normalised to (-pi, pi].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SpatialJoints {
    /// Base rotation, right hand rule about the vertical axis.
    pub base_rad: f64,

    /// Shoulder pitch, zero along the horizontal.
    pub shoulder_rad: f64,

    /// Elbow pitch relative to the upper arm.
    pub elbow_rad: f64,

    /// Wrist pitch relative to the forearm.
    pub wrist_rad: f64,

    /// Tool roll, passed through the solver unchanged.
    pub roll_rad: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// ------------------------------------------------------------------------------------------------

impl SpatialArm {
    /// Solve the inverse kinematics for a tool-tip target, tool pitch and
    /// tool roll.
    ///
    /// Returns `None` if the target is outside the workspace.
    pub fn ik(&self, target: &Point3<f64>, pitch_rad: f64, roll_rad: f64) -> Option<SpatialJoints> {
        let base_rad = target.y.atan2(target.x);

        // Project the target into the vertical plane through the base axis
        let r = (target.x * target.x + target.y * target.y).sqrt();

        // Wrist centre, with the tool vector removed at the demanded pitch
        let wx = r - self.tool_m * pitch_rad.cos();
        let wz = target.z - self.base_height_m - self.tool_m * pitch_rad.sin();

        let d_sq = wx * wx + wz * wz;
        let cos_elbow = (d_sq - self.upper_arm_m.powi(2) - self.forearm_m.powi(2))
            / (2.0 * self.upper_arm_m * self.forearm_m);

        if cos_elbow.abs() > 1.0 {
            return None;
        }

        let elbow_rad = cos_elbow.acos();
        let k1 = self.upper_arm_m + self.forearm_m * elbow_rad.cos();
        let k2 = self.forearm_m * elbow_rad.sin();
        let shoulder_rad = wz.atan2(wx) - k2.atan2(k1);

        // Wrist pitch closes the tool orientation
        let wrist_rad = pitch_rad - shoulder_rad - elbow_rad;

        Some(SpatialJoints {
            base_rad: norm_angle_pi(base_rad),
            shoulder_rad: norm_angle_pi(shoulder_rad),
            elbow_rad: norm_angle_pi(elbow_rad),
            wrist_rad: norm_angle_pi(wrist_rad),
            roll_rad: norm_angle_pi(roll_rad),
        })
    }

    /// Forward kinematics: the chain points (base, shoulder, elbow, wrist,
    /// tool tip) for a joint-space state.
    ///
    /// Roll has no effect on the chain points.
    pub fn fk(&self, joints: &SpatialJoints) -> [Point3<f64>; 5] {
        let a = joints.base_rad;
        let t2 = joints.shoulder_rad;
        let t23 = t2 + joints.elbow_rad;
        let t234 = t23 + joints.wrist_rad;

        let p0 = Point3::origin();
        let p1 = Point3::new(0.0, 0.0, self.base_height_m);

        let p2 = Point3::new(
            p1.x + self.upper_arm_m * t2.cos() * a.cos(),
            p1.y + self.upper_arm_m * t2.cos() * a.sin(),
            p1.z + self.upper_arm_m * t2.sin(),
        );
        let p3 = Point3::new(
            p2.x + self.forearm_m * t23.cos() * a.cos(),
            p2.y + self.forearm_m * t23.cos() * a.sin(),
            p2.z + self.forearm_m * t23.sin(),
        );
        let p4 = Point3::new(
            p3.x + self.tool_m * t234.cos() * a.cos(),
            p3.y + self.tool_m * t234.cos() * a.sin(),
            p3.z + self.tool_m * t234.sin(),
        );

        [p0, p1, p2, p3, p4]
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Solve a planar chain mounted on a rotating base for a 3-D target.
///
/// This is the 4 DOF positional layout: the base angle comes from the
/// target's bearing, and the planar solver runs in the vertical plane through
/// the base axis with `phi` as the in-plane tool orientation.
pub fn ik_turret(
    arm: &PlanarArm,
    target: &Point3<f64>,
    phi_rad: f64,
) -> Option<(f64, PlanarJoints)> {
    let base_rad = target.y.atan2(target.x);
    let r = (target.x * target.x + target.y * target.y).sqrt();

    arm.ik(&Point2::new(r, target.z), phi_rad)
        .map(|joints| (norm_angle_pi(base_rad), joints))
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    const EPS: f64 = 1e-9;

    fn arm() -> SpatialArm {
        SpatialArm {
            base_height_m: 0.2,
            upper_arm_m: 0.4,
            forearm_m: 0.3,
            tool_m: 0.1,
        }
    }

    #[test]
    fn test_straight_up() {
        let arm = arm();
        let apex = arm.base_height_m + arm.upper_arm_m + arm.forearm_m + arm.tool_m;
        let pitch = std::f64::consts::FRAC_PI_2;

        let joints = arm.ik(&Point3::new(0.0, 0.0, apex), pitch, 0.0).unwrap();
        assert!((joints.shoulder_rad - pitch).abs() < EPS);
        assert!(joints.elbow_rad.abs() < EPS);
        assert!(joints.wrist_rad.abs() < EPS);

        let points = arm.fk(&joints);
        assert!(points[4].x.abs() < EPS);
        assert!(points[4].y.abs() < EPS);
        assert!((points[4].z - apex).abs() < EPS);
    }

    #[test]
    fn test_ik_fk_roundtrip() {
        let arm = arm();
        let target = Point3::new(0.4, 0.2, 0.5);
        let pitch = std::f64::consts::FRAC_PI_4;
        let roll = 0.5;

        let joints = arm.ik(&target, pitch, roll).unwrap();
        assert!((joints.roll_rad - roll).abs() < EPS);

        let points = arm.fk(&joints);
        assert!((points[4].x - target.x).abs() < EPS);
        assert!((points[4].y - target.y).abs() < EPS);
        assert!((points[4].z - target.z).abs() < EPS);
    }

    #[test]
    fn test_base_follows_target_bearing() {
        let arm = arm();
        let target = Point3::new(0.0, 0.4, 0.4);

        let joints = arm.ik(&target, 0.0, 0.0).unwrap();
        assert!((joints.base_rad - std::f64::consts::FRAC_PI_2).abs() < EPS);
    }

    #[test]
    fn test_unreachable_target() {
        let arm = arm();
        assert!(arm.ik(&Point3::new(5.0, 0.0, 5.0), 0.0, 0.0).is_none());
    }

    #[test]
    fn test_ik_turret() {
        let planar = PlanarArm {
            upper_arm_m: 0.2285,
            forearm_m: 0.2285,
            tool_m: 0.2425,
        };
        let target = Point3::new(0.0, 0.25, 0.1);
        let phi = -std::f64::consts::FRAC_PI_2;

        let (base_rad, joints) = ik_turret(&planar, &target, phi).unwrap();
        assert!((base_rad - std::f64::consts::FRAC_PI_2).abs() < EPS);

        // The planar solution must land on the projected target
        let (tip, _) = planar.tool_pose(&joints);
        assert!((tip.x - 0.25).abs() < EPS);
        assert!((tip.y - 0.1).abs() < EPS);
    }
}
