//! Kinematics of the 3-link planar chain
//!
//! The chain is shoulder, elbow and a tool joint in one vertical plane. The
//! inverse solution subtracts the tool offset at the demanded orientation to
//! find the wrist point, solves the remaining 2-link problem by the law of
//! cosines, and closes the orientation with the tool joint.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

// Internal
use util::maths::norm_angle_pi;

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// Geometry of the planar chain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PlanarArm {
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

/// A joint-space solution for the planar chain.
///
/// All angles follow the right hand rule about the out-of-plane axis and are
/// normalised to (-pi, pi].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PlanarJoints {
    pub shoulder_rad: f64,
    pub elbow_rad: f64,
    pub wrist_rad: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMERATIONS
// ------------------------------------------------------------------------------------------------

/// Which of the two elbow branches to solve for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElbowConfig {
    /// Elbow joint angle positive.
    Down,

    /// Elbow joint angle negative, the mirrored solution.
    Up,
}

// ------------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// ------------------------------------------------------------------------------------------------

impl PlanarArm {
    /// Solve the inverse kinematics for a tool-tip target and orientation.
    ///
    /// Uses the positive-elbow branch. Returns `None` if the target is
    /// outside the workspace.
    pub fn ik(&self, target: &Point2<f64>, phi_rad: f64) -> Option<PlanarJoints> {
        self.ik_with_config(target, phi_rad, ElbowConfig::Down)
    }

    /// Solve the inverse kinematics on a chosen elbow branch.
    pub fn ik_with_config(
        &self,
        target: &Point2<f64>,
        phi_rad: f64,
        elbow: ElbowConfig,
    ) -> Option<PlanarJoints> {
        // Wrist point, with the tool offset removed at the demanded
        // orientation
        let wx = target.x - self.tool_m * phi_rad.cos();
        let wy = target.y - self.tool_m * phi_rad.sin();

        let r_sq = wx * wx + wy * wy;
        let cos_elbow = (r_sq - self.upper_arm_m.powi(2) - self.forearm_m.powi(2))
            / (2.0 * self.upper_arm_m * self.forearm_m);

        if cos_elbow.abs() > 1.0 {
            return None;
        }

        let elbow_rad = match elbow {
            ElbowConfig::Down => cos_elbow.acos(),
            ElbowConfig::Up => -cos_elbow.acos(),
        };

        let k1 = self.upper_arm_m + self.forearm_m * elbow_rad.cos();
        let k2 = self.forearm_m * elbow_rad.sin();
        let shoulder_rad = wy.atan2(wx) - k2.atan2(k1);

        // The tool joint closes the orientation
        let wrist_rad = phi_rad - shoulder_rad - elbow_rad;

        Some(PlanarJoints {
            shoulder_rad: norm_angle_pi(shoulder_rad),
            elbow_rad: norm_angle_pi(elbow_rad),
            wrist_rad: norm_angle_pi(wrist_rad),
        })
    }

    /// Forward kinematics: the chain points (shoulder, elbow, wrist, tool
    /// tip) for a joint-space state.
    pub fn fk(&self, joints: &PlanarJoints) -> [Point2<f64>; 4] {
        let t1 = joints.shoulder_rad;
        let t12 = t1 + joints.elbow_rad;
        let t123 = t12 + joints.wrist_rad;

        let p0 = Point2::origin();
        let p1 = Point2::new(
            self.upper_arm_m * t1.cos(),
            self.upper_arm_m * t1.sin(),
        );
        let p2 = Point2::new(
            p1.x + self.forearm_m * t12.cos(),
            p1.y + self.forearm_m * t12.sin(),
        );
        let p3 = Point2::new(
            p2.x + self.tool_m * t123.cos(),
            p2.y + self.tool_m * t123.sin(),
        );

        [p0, p1, p2, p3]
    }

    /// The tool tip position and orientation for a joint-space state.
    pub fn tool_pose(&self, joints: &PlanarJoints) -> (Point2<f64>, f64) {
        let points = self.fk(joints);
        let phi = joints.shoulder_rad + joints.elbow_rad + joints.wrist_rad;
        (points[3], norm_angle_pi(phi))
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    const EPS: f64 = 1e-9;

    /// The arm the hardware actually carries.
    fn arm() -> PlanarArm {
        PlanarArm {
            upper_arm_m: 0.2285,
            forearm_m: 0.2285,
            tool_m: 0.2425,
        }
    }

    #[test]
    fn test_fully_extended() {
        let arm = arm();
        let reach = arm.upper_arm_m + arm.forearm_m + arm.tool_m;

        let joints = arm.ik(&Point2::new(reach, 0.0), 0.0).unwrap();
        assert!(joints.shoulder_rad.abs() < EPS);
        assert!(joints.elbow_rad.abs() < EPS);
        assert!(joints.wrist_rad.abs() < EPS);

        let (tip, phi) = arm.tool_pose(&joints);
        assert!((tip.x - reach).abs() < EPS);
        assert!(tip.y.abs() < EPS);
        assert!(phi.abs() < EPS);
    }

    #[test]
    fn test_ik_fk_roundtrip() {
        let arm = arm();
        let target = Point2::new(0.20, 0.10);
        let phi = -std::f64::consts::FRAC_PI_2;

        let joints = arm.ik(&target, phi).unwrap();
        let (tip, tip_phi) = arm.tool_pose(&joints);

        assert!((tip.x - target.x).abs() < EPS);
        assert!((tip.y - target.y).abs() < EPS);
        assert!((tip_phi - phi).abs() < EPS);
    }

    #[test]
    fn test_elbow_branches_reach_same_target() {
        let arm = arm();
        let target = Point2::new(-0.20, -0.10);
        let phi = -std::f64::consts::FRAC_PI_2;

        let down = arm
            .ik_with_config(&target, phi, ElbowConfig::Down)
            .unwrap();
        let up = arm.ik_with_config(&target, phi, ElbowConfig::Up).unwrap();

        assert!(down.elbow_rad > 0.0);
        assert!(up.elbow_rad < 0.0);

        let (tip_down, _) = arm.tool_pose(&down);
        let (tip_up, _) = arm.tool_pose(&up);

        assert!((tip_down.x - target.x).abs() < EPS);
        assert!((tip_up.x - target.x).abs() < EPS);
        assert!((tip_down.y - tip_up.y).abs() < EPS);
    }

    #[test]
    fn test_unreachable_target() {
        let arm = arm();

        // Far outside the workspace
        assert!(arm.ik(&Point2::new(10.0, 10.0), 0.0).is_none());

        // Just past full reach
        let reach = arm.upper_arm_m + arm.forearm_m + arm.tool_m;
        assert!(arm.ik(&Point2::new(reach + 1e-3, 0.0), 0.0).is_none());
    }

    #[test]
    fn test_angles_normalised() {
        let arm = arm();
        let target = Point2::new(-0.15, -0.25);
        let phi = 3.0;

        let joints = arm.ik(&target, phi).unwrap();
        for angle in &[joints.shoulder_rad, joints.elbow_rad, joints.wrist_rad] {
            assert!(*angle > -std::f64::consts::PI - EPS);
            assert!(*angle <= std::f64::consts::PI + EPS);
        }
    }
}
