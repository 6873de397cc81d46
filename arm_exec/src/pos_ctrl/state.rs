//! Implementations for the PosCtrl state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{info, trace};
use nalgebra::Point2;
use serde::Serialize;
use std::collections::HashMap;

// Internal
use super::{Params, PosCtrlError, CHUNK_LIMIT};
use arm_kin::planar::PlanarJoints;
use servo_if::joints::{JointConfig, JointId};
use util::{
    archive::{Archived, Archiver},
    module::State,
    params,
    session::{try_get_elapsed_seconds, Session},
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Position control module state
#[derive(Default)]
pub struct PosCtrl {
    pub(crate) params: Params,

    pub(crate) report: StatusReport,
    arch_rows: Archiver,

    /// Target absolute step count per joint.
    targets: HashMap<JointId, i64>,

    /// Rows describing the last processing cycle, for archiving.
    last_rows: Vec<CycleRow>,
}

/// Input data to position control: the tracked absolute position of each
/// joint on this cycle.
#[derive(Default, Debug, Clone)]
pub struct InputData {
    pub abs_steps: HashMap<JointId, i64>,
}

/// Output demands from PosCtrl that the bus driver must execute.
#[derive(Clone, Debug, Default)]
pub struct OutputData {
    /// Relative move demands, absent for joints already on target.
    pub demands: HashMap<JointId, MoveDemand>,
}

/// A bounded relative move demand for one joint.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct MoveDemand {
    /// Relative move in motor ticks, within the chunk limit.
    pub delta_steps: i32,

    /// Demand speed in ticks/second.
    pub speed: u16,

    /// Demand acceleration in 100 ticks/second^2.
    pub acc: u8,
}

/// Status report for PosCtrl processing.
#[derive(Clone, Debug, Default)]
pub struct StatusReport {
    /// Remaining error (target - tracked) per joint.
    pub error_steps: HashMap<JointId, i64>,

    /// Joints whose demand was clamped to the chunk limit this cycle.
    pub chunk_limited: HashMap<JointId, bool>,
}

/// One archived row of a processing cycle.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CycleRow {
    pub time_s: f64,
    pub joint: JointId,
    pub target_steps: i64,
    pub abs_steps: i64,
    pub error_steps: i64,
    pub demand_steps: i32,
    pub chunk_limited: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl State for PosCtrl {
    type InitData = &'static str;
    type InitError = PosCtrlError;

    type InputData = InputData;
    type OutputData = OutputData;
    type StatusReport = StatusReport;
    type ProcError = PosCtrlError;

    /// Initialise the PosCtrl module.
    ///
    /// Expected init data is the path to the parameter file
    fn init(&mut self, init_data: Self::InitData, session: &Session) -> Result<(), PosCtrlError> {
        // Load the parameters
        self.params = params::load(init_data)?;

        // Create the arch folder for pos_ctrl
        let mut arch_path = session.arch_root.clone();
        arch_path.push("pos_ctrl");
        std::fs::create_dir_all(arch_path).unwrap();

        // Initialise the archiver
        self.arch_rows = Archiver::from_path(session, "pos_ctrl/cycles.csv").unwrap();

        // Targets are seeded from the trackers once the bus is up, nothing
        // more to do here.

        Ok(())
    }

    /// Perform one processing cycle of position control.
    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), PosCtrlError> {
        // Clear the status report
        self.report = StatusReport::default();
        self.last_rows.clear();

        let mut demands = HashMap::new();

        for (&joint, &abs_steps) in &input_data.abs_steps {
            let config = self
                .params
                .joints
                .get(&joint)
                .ok_or(PosCtrlError::UnknownJoint(joint))?;

            // A joint with no target yet holds position
            let target = *self.targets.entry(joint).or_insert(abs_steps);

            let error = target - abs_steps;
            let clamped = error.max(-CHUNK_LIMIT).min(CHUNK_LIMIT);
            let limited = clamped != error;

            self.report.error_steps.insert(joint, error);
            self.report.chunk_limited.insert(joint, limited);

            if error != 0 {
                demands.insert(
                    joint,
                    MoveDemand {
                        delta_steps: clamped as i32,
                        speed: config.speed,
                        acc: config.acc,
                    },
                );
            }

            self.last_rows.push(CycleRow {
                time_s: try_get_elapsed_seconds().unwrap_or(0.0),
                joint,
                target_steps: target,
                abs_steps,
                error_steps: error,
                demand_steps: clamped as i32,
                chunk_limited: limited,
            });
        }

        trace!("PosCtrl demands: {:?}", demands);

        Ok((OutputData { demands }, self.report.clone()))
    }
}

impl Archived for PosCtrl {
    fn write(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        for row in &self.last_rows {
            self.arch_rows.serialise(row)?;
        }

        Ok(())
    }
}

impl PosCtrl {
    /// Build a controller directly from a parameter set, without a session.
    ///
    /// Archiving stays disabled, so this is only suitable for tests and
    /// tools which never call `write`.
    pub fn with_params(params: Params) -> Self {
        Self {
            params,
            ..Default::default()
        }
    }

    /// Get the configuration of a joint.
    pub fn config(&self, joint: JointId) -> Option<&JointConfig> {
        self.params.joints.get(&joint)
    }

    /// All configured joints and their configurations, ordered by servo ID.
    pub fn joints(&self) -> Vec<(JointId, JointConfig)> {
        let mut joints: Vec<(JointId, JointConfig)> = self
            .params
            .joints
            .iter()
            .map(|(&joint, config)| (joint, config.clone()))
            .collect();
        joints.sort_by_key(|(_, config)| config.servo_id);
        joints
    }

    /// The configured startup whole-turn count of a joint.
    pub fn initial_turns(&self, joint: JointId) -> i64 {
        self.params.initial_turns.get(&joint).copied().unwrap_or(0)
    }

    /// Seed the absolute step target of a joint, usually from the tracker's
    /// view at startup.
    pub fn seed_target(&mut self, joint: JointId, steps: i64) {
        self.targets.insert(joint, steps);
    }

    /// The current absolute step target of a joint.
    pub fn target_steps(&self, joint: JointId) -> Option<i64> {
        self.targets.get(&joint).copied()
    }

    /// The current target expressed as an output angle.
    pub fn target_angle_deg(&self, joint: JointId) -> Option<f64> {
        let config = self.params.joints.get(&joint)?;
        self.targets
            .get(&joint)
            .map(|&steps| config.steps_to_angle(steps))
    }

    /// Jog the target of a joint by a delta output angle.
    pub fn update_target_angle(
        &mut self,
        joint: JointId,
        delta_deg: f64,
    ) -> Result<i64, PosCtrlError> {
        let config = self
            .params
            .joints
            .get(&joint)
            .ok_or(PosCtrlError::UnknownJoint(joint))?;

        let delta_steps = config.angle_delta_to_steps(delta_deg);
        let target = self.targets.entry(joint).or_insert(0);
        *target += delta_steps;

        info!(
            "[{}] {:+}° -> Δsteps={}, target_steps={}",
            joint, delta_deg, delta_steps, target
        );

        Ok(*target)
    }

    /// Jog the target of a joint by a raw step delta.
    pub fn update_target_steps(&mut self, joint: JointId, delta_steps: i64) -> i64 {
        let target = self.targets.entry(joint).or_insert(0);
        *target += delta_steps;

        info!("[{}] Δtarget_steps={} -> target_steps={}", joint, delta_steps, target);

        *target
    }

    /// Set the absolute output angle target of a joint.
    pub fn set_target_angle(&mut self, joint: JointId, angle_deg: f64) -> Result<i64, PosCtrlError> {
        let config = self
            .params
            .joints
            .get(&joint)
            .ok_or(PosCtrlError::UnknownJoint(joint))?;

        let steps = config.angle_to_steps(angle_deg);
        self.targets.insert(joint, steps);

        Ok(steps)
    }

    /// Resolve a planar IK target into shoulder/elbow/wrist angle targets.
    pub fn apply_ik_target(
        &mut self,
        x_m: f64,
        y_m: f64,
        phi_rad: f64,
    ) -> Result<PlanarJoints, PosCtrlError> {
        let geom = self.params.planar_geom.ok_or(PosCtrlError::NoGeometry)?;

        let joints = geom
            .ik(&Point2::new(x_m, y_m), phi_rad)
            .ok_or(PosCtrlError::Unreachable(x_m, y_m))?;

        self.set_target_angle(JointId::Shoulder, joints.shoulder_rad.to_degrees())?;
        self.set_target_angle(JointId::Elbow, joints.elbow_rad.to_degrees())?;
        self.set_target_angle(JointId::Wrist, joints.wrist_rad.to_degrees())?;

        Ok(joints)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use arm_kin::planar::PlanarArm;

    fn joint_config(servo_id: u8, gear_ratio: f64) -> JointConfig {
        JointConfig {
            servo_id,
            gear_ratio,
            starting_angle_deg: 0.0,
            speed: 1200,
            acc: 50,
        }
    }

    fn controller() -> PosCtrl {
        let mut params = Params::default();
        params.joints.insert(JointId::Base, joint_config(1, 1.0));
        params.joints.insert(JointId::Shoulder, joint_config(2, 3.0));
        params.joints.insert(JointId::Elbow, joint_config(3, 3.0));
        params.joints.insert(JointId::Wrist, joint_config(4, 1.0));
        params.planar_geom = Some(PlanarArm {
            upper_arm_m: 0.2285,
            forearm_m: 0.2285,
            tool_m: 0.2425,
        });
        PosCtrl::with_params(params)
    }

    #[test]
    fn test_holds_position_without_target() {
        let mut ctrl = controller();

        let mut input = InputData::default();
        input.abs_steps.insert(JointId::Base, 512);

        let (output, report) = ctrl.proc(&input).unwrap();
        assert!(output.demands.is_empty());
        assert_eq!(report.error_steps[&JointId::Base], 0);

        // The untargeted joint adopted its measured position as target
        assert_eq!(ctrl.target_steps(JointId::Base), Some(512));
    }

    #[test]
    fn test_demand_towards_target() {
        let mut ctrl = controller();
        ctrl.seed_target(JointId::Base, 1000);

        let mut input = InputData::default();
        input.abs_steps.insert(JointId::Base, 400);

        let (output, report) = ctrl.proc(&input).unwrap();
        let demand = output.demands[&JointId::Base];
        assert_eq!(demand.delta_steps, 600);
        assert_eq!(demand.speed, 1200);
        assert_eq!(report.error_steps[&JointId::Base], 600);
        assert!(!report.chunk_limited[&JointId::Base]);
    }

    #[test]
    fn test_demand_clamped_to_chunk_limit() {
        let mut ctrl = controller();
        ctrl.seed_target(JointId::Base, 100_000);

        let mut input = InputData::default();
        input.abs_steps.insert(JointId::Base, 0);

        let (output, report) = ctrl.proc(&input).unwrap();
        assert_eq!(
            output.demands[&JointId::Base].delta_steps,
            CHUNK_LIMIT as i32
        );
        assert!(report.chunk_limited[&JointId::Base]);

        // Negative errors clamp symmetrically
        ctrl.seed_target(JointId::Base, -100_000);
        let (output, _) = ctrl.proc(&input).unwrap();
        assert_eq!(
            output.demands[&JointId::Base].delta_steps,
            -CHUNK_LIMIT as i32
        );
    }

    #[test]
    fn test_angle_jog_conversion() {
        let mut ctrl = controller();
        ctrl.seed_target(JointId::Shoulder, 0);

        // 3:1 gearing, so 10 degrees is 10 * 4096 * 3 / 360 = 341 steps
        let target = ctrl
            .update_target_angle(JointId::Shoulder, 10.0)
            .unwrap();
        assert_eq!(target, 341);

        let target = ctrl
            .update_target_angle(JointId::Shoulder, -10.0)
            .unwrap();
        assert_eq!(target, 0);
    }

    #[test]
    fn test_step_jog() {
        let mut ctrl = controller();
        ctrl.seed_target(JointId::Base, 100);

        assert_eq!(ctrl.update_target_steps(JointId::Base, 1024), 1124);
        assert_eq!(ctrl.update_target_steps(JointId::Base, -2048), -924);
        assert_eq!(ctrl.target_steps(JointId::Base), Some(-924));
    }

    #[test]
    fn test_unknown_joint_is_an_error() {
        let mut ctrl = PosCtrl::with_params(Params::default());

        let mut input = InputData::default();
        input.abs_steps.insert(JointId::Roll, 0);
        assert!(ctrl.proc(&input).is_err());

        assert!(ctrl.update_target_angle(JointId::Roll, 1.0).is_err());
    }

    #[test]
    fn test_ik_target_sets_joint_targets() {
        let mut ctrl = controller();

        let joints = ctrl
            .apply_ik_target(0.20, 0.10, -std::f64::consts::FRAC_PI_2)
            .unwrap();

        let shoulder = ctrl.target_angle_deg(JointId::Shoulder).unwrap();
        assert!((shoulder - joints.shoulder_rad.to_degrees()).abs() < 0.01);

        let elbow_steps = ctrl.target_steps(JointId::Elbow).unwrap();
        let expected = ctrl
            .config(JointId::Elbow)
            .unwrap()
            .angle_to_steps(joints.elbow_rad.to_degrees());
        assert_eq!(elbow_steps, expected);
    }

    #[test]
    fn test_unreachable_ik_target() {
        let mut ctrl = controller();
        match ctrl.apply_ik_target(5.0, 5.0, 0.0) {
            Err(PosCtrlError::Unreachable(_, _)) => (),
            other => panic!("expected unreachable, got {:?}", other),
        }
    }
}
