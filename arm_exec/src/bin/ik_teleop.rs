//! Cartesian IK teleoperation
//!
//! Jogs a cartesian target around the planar workspace, solves the analytic
//! IK for every new target and demands the resulting joint angles as absolute
//! positions. Joints run in position mode here; the multi-turn trackers keep
//! the displayed angles honest across register wraps.
//!
//! Keys (line input): d/a move the target out/in, w/s move it up/down,
//! p shows the tracked state, x zeroes the arm and quits.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Report};
use log::{info, warn};
use nalgebra::Point2;
use serde::Deserialize;
use std::collections::HashMap;
use std::convert::TryFrom;
use std::io::BufRead;

// Internal
use arm_lib::joint_track::MultiTurnTracker;
use arm_lib::pos_ctrl::Params as PosCtrlParams;
use servo_if::{
    bus::{OperatingMode, SerialBus, StsBus},
    joints::{JointConfig, JointId},
};
use util::{
    logger::{logger_init, LevelFilter},
    maths::clamp,
    session::Session,
};

// ---------------------------------------------------------------------------
// PARAMETERS
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct IkTeleopParams {
    /// Serial device the servo bus hangs off.
    serial_device: String,

    /// Serial baud rate.
    baud: u32,

    /// Starting cartesian target.
    ///
    /// Units: meters
    start_x_m: f64,
    start_y_m: f64,

    /// Tool orientation held through all moves.
    ///
    /// Units: radians
    phi_rad: f64,

    /// Target change per jog key press.
    ///
    /// Units: meters
    jog_step_m: f64,

    /// Workspace bounds the target is clamped to.
    ///
    /// Units: meters
    min_x_m: f64,
    max_x_m: f64,
    min_y_m: f64,
    max_y_m: f64,
}

// ---------------------------------------------------------------------------
// MAIN
// ---------------------------------------------------------------------------

fn main() -> Result<(), Report> {
    // ---- EARLY INITIALISATION ----

    let session =
        Session::new("ik_teleop", "sessions").wrap_err("Failed to create the session")?;

    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    info!("Cartesian IK Teleoperation\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let params: IkTeleopParams =
        util::params::load("ik_teleop.toml").wrap_err("Could not load teleop params")?;

    let ctrl_params: PosCtrlParams =
        util::params::load("pos_ctrl.toml").wrap_err("Could not load joint params")?;

    let geom = ctrl_params
        .planar_geom
        .ok_or_else(|| color_eyre::eyre::eyre!("pos_ctrl.toml carries no planar geometry"))?;

    // ---- BUS INITIALISATION ----

    let mut bus = StsBus::open(&params.serial_device, params.baud)
        .wrap_err("Failed to open the servo bus")?;

    // Absolute angle demands need position mode
    for (joint, config) in &ctrl_params.joints {
        bus.set_mode(config.servo_id, OperatingMode::Position)
            .wrap_err_with(|| format!("Failed to set position mode on joint {}", joint))?;
        info!("{}: position mode enabled", joint);
    }

    // Start from a known state
    info!("Sending all joints to zero");
    zero_all(&mut bus, &ctrl_params.joints)?;
    info!("At zero");

    // Trackers watch the absolute count so displayed angles survive wraps
    let mut trackers: HashMap<JointId, MultiTurnTracker> = HashMap::new();
    for (&joint, config) in &ctrl_params.joints {
        let raw = bus.read_abs_count(config.servo_id)?;
        trackers.insert(joint, MultiTurnTracker::new(raw, 0));
    }

    // ---- KEY LOOP ----

    let mut x_m = params.start_x_m;
    let mut y_m = params.start_y_m;

    info!("Entering key loop");
    info!("    d/a target out/in, w/s target up/down, p info, x quit");

    solve_and_demand(&mut bus, &ctrl_params.joints, &geom, x_m, y_m, params.phi_rad);

    let stdin = std::io::stdin();

    for line in stdin.lock().lines() {
        let line = line.wrap_err("Failed to read from stdin")?;
        let key = match line.trim().chars().next() {
            Some(c) => c,
            None => continue,
        };

        let (dx, dy) = match key.to_ascii_lowercase() {
            'd' => (params.jog_step_m, 0.0),
            'a' => (-params.jog_step_m, 0.0),
            'w' => (0.0, params.jog_step_m),
            's' => (0.0, -params.jog_step_m),
            'p' => {
                show_tracked_state(&mut bus, &ctrl_params.joints, &mut trackers);
                continue;
            }
            'x' | '\x1b' => break,
            other => {
                info!("Unknown key '{}', no action taken", other);
                continue;
            }
        };

        x_m = clamp(&(x_m + dx), &params.min_x_m, &params.max_x_m);
        y_m = clamp(&(y_m + dy), &params.min_y_m, &params.max_y_m);

        solve_and_demand(&mut bus, &ctrl_params.joints, &geom, x_m, y_m, params.phi_rad);

        // Keep the trackers fresh while the arm chases the target
        for (&joint, config) in &ctrl_params.joints {
            if let Ok(raw) = bus.read_abs_count(config.servo_id) {
                if let Some(tracker) = trackers.get_mut(&joint) {
                    tracker.update(raw);
                }
            }
        }
    }

    // ---- SHUTDOWN ----

    info!("Sending all joints to zero");
    zero_all(&mut bus, &ctrl_params.joints)?;
    info!("At zero");

    session.exit();

    info!("Bus closed. Program exited.");

    Ok(())
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Solve the planar IK for the target and demand the solution angles.
fn solve_and_demand(
    bus: &mut SerialBus,
    joints: &HashMap<JointId, JointConfig>,
    geom: &arm_kin::planar::PlanarArm,
    x_m: f64,
    y_m: f64,
    phi_rad: f64,
) {
    let solution = match geom.ik(&Point2::new(x_m, y_m), phi_rad) {
        Some(s) => s,
        None => {
            warn!("Target ({:.3}, {:.3}) is unreachable", x_m, y_m);
            return;
        }
    };

    info!(
        "Target ({:.3}, {:.3}): shoulder {:.2}°, elbow {:.2}°, wrist {:.2}°",
        x_m,
        y_m,
        solution.shoulder_rad.to_degrees(),
        solution.elbow_rad.to_degrees(),
        solution.wrist_rad.to_degrees()
    );

    let demands = [
        (JointId::Shoulder, solution.shoulder_rad.to_degrees()),
        (JointId::Elbow, solution.elbow_rad.to_degrees()),
        (JointId::Wrist, solution.wrist_rad.to_degrees()),
    ];

    for (joint, angle_deg) in &demands {
        let config = match joints.get(joint) {
            Some(c) => c,
            None => continue,
        };

        let steps = config.angle_to_steps(*angle_deg);
        match i32::try_from(steps) {
            Ok(steps) => {
                if let Err(e) = bus.write_position(config.servo_id, steps, config.speed, config.acc)
                {
                    warn!("{}: position demand failed: {}", joint, e);
                }
            }
            Err(_) => warn!("{}: demand {} steps is out of range", joint, steps),
        }
    }
}

/// Log the tracked absolute position and derived angle of every joint.
fn show_tracked_state(
    bus: &mut SerialBus,
    joints: &HashMap<JointId, JointConfig>,
    trackers: &mut HashMap<JointId, MultiTurnTracker>,
) {
    for (joint, config) in joints {
        let raw = match bus.read_abs_count(config.servo_id) {
            Ok(r) => r,
            Err(e) => {
                warn!("{}: absolute count read failed: {}", joint, e);
                continue;
            }
        };

        if let Some(tracker) = trackers.get_mut(joint) {
            let abs = tracker.update(raw);
            info!(
                "[{:8}] abs:{} turns:{} angle:{:.2}°",
                joint.to_string(),
                abs,
                tracker.turns(),
                config.steps_to_angle(abs)
            );
        }
    }
}

/// Demand zero on every joint and wait until all report stopped.
fn zero_all(
    bus: &mut SerialBus,
    joints: &HashMap<JointId, JointConfig>,
) -> Result<(), Report> {
    for (joint, config) in joints {
        bus.write_position(config.servo_id, 0, config.speed, config.acc)
            .wrap_err_with(|| format!("Failed to zero joint {}", joint))?;
    }

    for (joint, config) in joints {
        bus.wait_stopped(config.servo_id)
            .wrap_err_with(|| format!("Joint {} never reported stopped", joint))?;
    }

    Ok(())
}
