//! # Arm command console
//!
//! Interactive console issuing arm commands straight at the servo bus. Each
//! line is parsed as an [`ArmCmd`] subcommand, so `jog elbow -10`, `ik 0.2
//! 0.1 -1.57`, `wheel base 1200`, `zero`, `info` and `stop` all work the way
//! they do in motion scripts. `quit` (or Ctrl-C) leaves.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Report};
use nalgebra::Point2;
use rustyline::error::ReadlineError;
use rustyline::Editor;
use serde::Deserialize;
use std::collections::HashMap;
use std::convert::TryFrom;
use structopt::StructOpt;

// Internal
use arm_kin::planar::PlanarArm;
use servo_if::{
    bus::{OperatingMode, SerialBus, StsBus},
    cmd::ArmCmd,
    joints::{JointConfig, JointId},
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

const PROMPT: &str = "arm $ ";
const HISTORY_PATH: &str = "data/history.txt";

// ---------------------------------------------------------------------------
// PARAMETERS
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ConsoleParams {
    /// Serial device the servo bus hangs off.
    serial_device: String,

    /// Serial baud rate.
    baud: u32,

    /// Configuration of every joint the console may command.
    joints: HashMap<JointId, JointConfig>,

    /// Geometry used to resolve `ik` targets.
    planar_geom: Option<PlanarArm>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// What one console line asks for.
enum ConsoleInput {
    Cmd(ArmCmd),
    Quit,
    Empty,
}

// ---------------------------------------------------------------------------
// MAIN
// ---------------------------------------------------------------------------

fn main() -> Result<(), Report> {
    // ---- PARAMETERS AND BUS ----

    let params: ConsoleParams =
        util::params::load("arm_console.toml").wrap_err("Could not load console params")?;

    let mut bus = StsBus::open(&params.serial_device, params.baud)
        .wrap_err("Failed to open the servo bus")?;

    // The console talks absolute angles, so joints run in position mode
    for (joint, config) in &params.joints {
        bus.set_mode(config.servo_id, OperatingMode::Position)
            .wrap_err_with(|| format!("Failed to set position mode on joint {}", joint))?;
    }

    println!(
        "Connected to {} joints on {}",
        params.joints.len(),
        params.serial_device
    );

    // ---- REPL ----

    let mut rl = Editor::<(), rustyline::history::FileHistory>::new()
        .wrap_err("Failed to start the line editor")?;
    if rl.load_history(HISTORY_PATH).is_err() {
        println!("No history detected");
    }

    loop {
        let readline = rl.readline(PROMPT);
        match readline {
            Ok(line) => {
                let _ = rl.add_history_entry(line.as_str());
                match parse(&line) {
                    Ok(ConsoleInput::Cmd(cmd)) => {
                        if let Err(e) = execute(cmd, &mut bus, &params) {
                            println!("Command failed: {}", e);
                        }
                    }
                    Ok(ConsoleInput::Quit) => break,
                    Ok(ConsoleInput::Empty) => (),
                    Err(msg) => println!("{}", msg),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("Unhandled Error: {:?}", err);
                break;
            }
        }
    }

    if let Err(e) = rl.save_history(HISTORY_PATH) {
        println!("Couldn't save history: {}", e);
    }

    println!("Exiting...");

    Ok(())
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Parse one console line.
fn parse(line: &str) -> Result<ConsoleInput, String> {
    let split: Vec<&str> = line.split_whitespace().collect();

    match split.first() {
        None => Ok(ConsoleInput::Empty),
        Some(&"quit") | Some(&"exit") => Ok(ConsoleInput::Quit),
        Some(_) => {
            match ArmCmd::from_iter_safe(std::iter::once("arm").chain(split.into_iter())) {
                Ok(cmd) => Ok(ConsoleInput::Cmd(cmd)),
                Err(e) => Err(e.message),
            }
        }
    }
}

/// Execute one command against the bus.
fn execute(cmd: ArmCmd, bus: &mut SerialBus, params: &ConsoleParams) -> Result<(), Report> {
    if let Ok(json) = cmd.to_json() {
        println!("> {}", json);
    }

    match cmd {
        ArmCmd::Rotation { dems } => {
            if dems.pos_deg.is_empty() {
                println!("rot carries no angles on the console, use jog or a motion script");
                return Ok(());
            }
            for (joint, angle_deg) in dems.pos_deg {
                demand_angle(bus, params, joint, angle_deg);
            }
        }

        ArmCmd::Jog { joint, delta_deg } => {
            let config = match params.joints.get(&joint) {
                Some(c) => c,
                None => {
                    println!("{}: no such joint configured", joint);
                    return Ok(());
                }
            };

            let present = bus.read_present_position(config.servo_id)?;
            let target = present as i64 + config.angle_delta_to_steps(delta_deg);

            match i32::try_from(target) {
                Ok(target) => {
                    bus.write_position(config.servo_id, target, config.speed, config.acc)?;
                    println!(
                        "{}: {} -> {} steps ({:+.1}°)",
                        joint, present, target, delta_deg
                    );
                }
                Err(_) => println!("{}: target {} steps is out of range", joint, target),
            }
        }

        ArmCmd::InverseKinematics { x_m, y_m, phi_rad } => {
            let geom = match params.planar_geom {
                Some(g) => g,
                None => {
                    println!("No planar geometry configured, cannot solve ik");
                    return Ok(());
                }
            };

            match geom.ik(&Point2::new(x_m, y_m), phi_rad) {
                Some(solution) => {
                    println!(
                        "Solved: shoulder {:.2}°, elbow {:.2}°, wrist {:.2}°",
                        solution.shoulder_rad.to_degrees(),
                        solution.elbow_rad.to_degrees(),
                        solution.wrist_rad.to_degrees()
                    );
                    demand_angle(bus, params, JointId::Shoulder, solution.shoulder_rad.to_degrees());
                    demand_angle(bus, params, JointId::Elbow, solution.elbow_rad.to_degrees());
                    demand_angle(bus, params, JointId::Wrist, solution.wrist_rad.to_degrees());
                }
                None => println!("Target ({:.3}, {:.3}) is unreachable", x_m, y_m),
            }
        }

        ArmCmd::Wheel { joint, speed } => {
            let config = match params.joints.get(&joint) {
                Some(c) => c,
                None => {
                    println!("{}: no such joint configured", joint);
                    return Ok(());
                }
            };

            bus.set_mode(config.servo_id, OperatingMode::Wheel)?;
            bus.write_wheel_speed(config.servo_id, speed, config.acc)?;
            println!("{}: wheel mode at {} ticks/s", joint, speed);
        }

        ArmCmd::Zero => {
            println!("Sending all joints to zero");
            for (_, config) in &params.joints {
                bus.set_mode(config.servo_id, OperatingMode::Position)?;
                bus.write_position(config.servo_id, 0, config.speed, config.acc)?;
            }
            for (_, config) in &params.joints {
                bus.wait_stopped(config.servo_id)?;
            }
            println!("At zero");
        }

        ArmCmd::Info => {
            for (joint, config) in &params.joints {
                match bus.read_status(config.servo_id) {
                    Ok(s) => println!(
                        "[{:8}] pos:{} speed:{} load:{:.1}% current:{:.1}mA temp:{}C moving:{}",
                        joint.to_string(),
                        s.position,
                        s.speed,
                        s.load_pct,
                        s.current_ma,
                        s.temperature_c,
                        s.moving
                    ),
                    Err(e) => println!("{}: status read failed: {}", joint, e),
                }
            }
        }

        ArmCmd::Stop => {
            println!("Stopping all joints");
            for (joint, config) in &params.joints {
                if let Err(e) = bus.write_wheel_speed(config.servo_id, 0, config.acc) {
                    println!("{}: stop demand failed: {}", joint, e);
                }
            }
        }
    }

    Ok(())
}

/// Demand an absolute output angle on one joint.
fn demand_angle(bus: &mut SerialBus, params: &ConsoleParams, joint: JointId, angle_deg: f64) {
    let config = match params.joints.get(&joint) {
        Some(c) => c,
        None => {
            println!("{}: no such joint configured", joint);
            return;
        }
    };

    let steps = config.angle_to_steps(angle_deg);
    match i32::try_from(steps) {
        Ok(steps) => {
            if let Err(e) = bus.write_position(config.servo_id, steps, config.speed, config.acc) {
                println!("{}: position demand failed: {}", joint, e);
            }
        }
        Err(_) => println!("{}: demand {} steps is out of range", joint, steps),
    }
}
