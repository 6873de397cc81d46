//! Wheel-mode teleoperation
//!
//! Puts every configured joint into wheel mode and jogs them from the shared
//! teleop keymap: each entered line's first character picks the action. All
//! speed demands are zeroed on exit.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Report};
use log::{info, warn};
use serde::Deserialize;
use std::collections::HashMap;
use std::io::BufRead;

// Internal
use arm_lib::teleop::{action_for_key, TeleopAction};
use servo_if::{
    bus::{OperatingMode, SerialBus, StsBus},
    joints::JointId,
};
use util::{
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ---------------------------------------------------------------------------
// PARAMETERS
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct WheelTeleopParams {
    /// Serial device the servo bus hangs off.
    serial_device: String,

    /// Serial baud rate.
    baud: u32,

    /// Jog speed demand.
    ///
    /// Units: ticks/second
    speed: i32,

    /// Demand acceleration.
    ///
    /// Units: 100 ticks/second^2
    acc: u8,

    /// Servo bus ID of each jogged joint.
    joints: HashMap<JointId, u8>,
}

// ---------------------------------------------------------------------------
// MAIN
// ---------------------------------------------------------------------------

fn main() -> Result<(), Report> {
    // ---- EARLY INITIALISATION ----

    let session =
        Session::new("wheel_teleop", "sessions").wrap_err("Failed to create the session")?;

    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    info!("Wheel-Mode Teleoperation\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let params: WheelTeleopParams =
        util::params::load("wheel_teleop.toml").wrap_err("Could not load teleop params")?;

    if params.joints.is_empty() {
        util::raise_error!("No joints configured for wheel teleop");
    }

    // ---- BUS INITIALISATION ----

    let mut bus = StsBus::open(&params.serial_device, params.baud)
        .wrap_err("Failed to open the servo bus")?;

    for (joint, &id) in &params.joints {
        let enabled = bus
            .set_mode(id, OperatingMode::Wheel)
            .and_then(|_| bus.set_torque_enable(id, true));
        match enabled {
            Ok(()) => info!("{}: wheel mode enabled", joint),
            Err(e) => warn!("{}: could not enable wheel mode: {}", joint, e),
        }
    }

    // ---- KEY LOOP ----

    info!("Entering key loop");
    info!("    q/a w/s e/d r/f t/g jog joints, p info, space stop, x quit");

    let stdin = std::io::stdin();

    for line in stdin.lock().lines() {
        let line = line.wrap_err("Failed to read from stdin")?;
        let key = match line.trim().chars().next() {
            Some(c) => c,
            None => continue,
        };

        match action_for_key(key) {
            Some(TeleopAction::Jog { joint, dir }) => {
                let id = match params.joints.get(&joint) {
                    Some(&id) => id,
                    None => {
                        info!("{}: not configured for wheel teleop", joint);
                        continue;
                    }
                };

                let speed = if dir > 0.0 { params.speed } else { -params.speed };
                let sense = if dir > 0.0 { "clockwise" } else { "counter-clockwise" };

                match bus.write_wheel_speed(id, speed, params.acc) {
                    Ok(()) => info!("{}: {}", joint, sense),
                    Err(e) => warn!("{}: speed demand failed: {}", joint, e),
                }
            }
            Some(TeleopAction::StopAll) => {
                info!("Stopping all joints");
                stop_all(&mut bus, &params);
            }
            Some(TeleopAction::Info) => {
                for (joint, &id) in &params.joints {
                    match bus.read_status(id) {
                        Ok(s) => info!(
                            "[{:8}] speed:{} load:{:.1}% current:{:.1}mA temp:{}C",
                            joint.to_string(),
                            s.speed,
                            s.load_pct,
                            s.current_ma,
                            s.temperature_c
                        ),
                        Err(e) => warn!("{}: status read failed: {}", joint, e),
                    }
                }
            }
            Some(TeleopAction::Quit) => break,
            Some(_) => info!("Key '{}' has no wheel-mode action", key),
            None => info!("Unknown key '{}', no action taken", key),
        }
    }

    // ---- SHUTDOWN ----

    // Leave the motors stopped
    stop_all(&mut bus, &params);

    session.exit();

    info!("Bus closed. Motors stopped. Program exited.");

    Ok(())
}

/// Zero the speed demand of every configured joint.
fn stop_all(bus: &mut SerialBus, params: &WheelTeleopParams) {
    for (joint, &id) in &params.joints {
        if let Err(e) = bus.write_wheel_speed(id, 0, params.acc) {
            warn!("{}: stop demand failed: {}", joint, e);
        }
    }
}
