//! Capture servo telemetry into session CSV archives
//!
//! Samples speed, load, current, voltage and temperature of a set of servos
//! at a fixed rate and archives the records under the session directory, one
//! CSV per servo.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Report};
use log::{info, warn};
use serde::Deserialize;
use std::collections::HashMap;
use std::thread;
use std::time::Duration;

// Internal
use arm_lib::telem::TelemRecord;
use servo_if::bus::StsBus;
use util::{
    archive::Archiver,
    logger::{logger_init, LevelFilter},
    session::{get_elapsed_seconds, Session},
};

// ---------------------------------------------------------------------------
// PARAMETERS
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TelemCaptureParams {
    /// Serial device the servo bus hangs off.
    serial_device: String,

    /// Serial baud rate.
    baud: u32,

    /// Bus IDs of the servos to sample.
    servo_ids: Vec<u8>,

    /// Sample period.
    ///
    /// Units: seconds
    period_s: f64,

    /// Total capture duration.
    ///
    /// Units: seconds
    duration_s: f64,
}

// ---------------------------------------------------------------------------
// MAIN
// ---------------------------------------------------------------------------

fn main() -> Result<(), Report> {
    // ---- EARLY INITIALISATION ----

    let session =
        Session::new("telem_capture", "sessions").wrap_err("Failed to create the session")?;

    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    info!("Servo Telemetry Capture\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let params: TelemCaptureParams =
        util::params::load("telem_capture.toml").wrap_err("Could not load capture params")?;

    // ---- BUS AND ARCHIVE INITIALISATION ----

    let mut bus = StsBus::open(&params.serial_device, params.baud)
        .wrap_err("Failed to open the servo bus")?;

    let mut archivers: HashMap<u8, Archiver> = HashMap::new();
    for &id in &params.servo_ids {
        archivers.insert(
            id,
            Archiver::from_path(&session, format!("telem_{:03}.csv", id))
                .map_err(|e| color_eyre::eyre::eyre!("Failed to create archive: {}", e))?,
        );
    }

    info!(
        "Capturing {} servos every {} s for {} s",
        params.servo_ids.len(),
        params.period_s,
        params.duration_s
    );

    // ---- CAPTURE LOOP ----

    let mut num_samples = 0u64;

    while get_elapsed_seconds() < params.duration_s {
        for &id in &params.servo_ids {
            match bus.read_status(id) {
                Ok(status) => {
                    let record = TelemRecord::from_status(id, &status);
                    if let Some(archiver) = archivers.get_mut(&id) {
                        if let Err(e) = archiver.serialise(record) {
                            warn!("[ID:{:03}] archive write failed: {}", id, e);
                        }
                    }
                    num_samples += 1;
                }
                Err(e) => warn!("[ID:{:03}] status read failed: {}", id, e),
            }
        }

        thread::sleep(Duration::from_secs_f64(params.period_s));
    }

    info!("Capture complete, {} samples archived", num_samples);

    session.exit();

    Ok(())
}
