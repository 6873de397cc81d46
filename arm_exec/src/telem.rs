//! Telemetry records for archiving servo state

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Serialize;

// Internal
use servo_if::bus::ServoStatus;
use util::session::get_elapsed_seconds;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// One archived telemetry sample of one servo.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TelemRecord {
    /// Session time of the sample.
    pub time_s: f64,

    /// Bus ID of the sampled servo.
    pub servo_id: u8,

    /// Present position in ticks.
    pub position: i32,

    /// Present speed in ticks/second.
    pub speed: i32,

    /// Present load as a percentage of stall.
    pub load_pct: f64,

    /// Estimated output torque as a fraction of stall torque.
    pub torque_frac: f64,

    /// Present current in milliamps.
    pub current_ma: f64,

    /// Supply voltage in volts.
    pub voltage_v: f64,

    /// Internal temperature in degrees C.
    pub temperature_c: u8,

    /// Whether the servo reported itself moving.
    pub moving: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TelemRecord {
    /// Build a record from a status snapshot, stamped with the current
    /// session time.
    pub fn from_status(servo_id: u8, status: &ServoStatus) -> Self {
        Self {
            time_s: get_elapsed_seconds(),
            servo_id,
            position: status.position,
            speed: status.speed,
            load_pct: status.load_pct,
            torque_frac: status.load_pct / 100.0,
            current_ma: status.current_ma,
            voltage_v: status.voltage_v,
            temperature_c: status.temperature_c,
            moving: status.moving,
        }
    }
}
