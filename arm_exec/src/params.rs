//! # Arm Executable Parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
pub struct ArmExecParams {
    /// Serial device the servo bus hangs off.
    ///
    /// For example "/dev/ttyUSB0".
    pub serial_device: String,

    /// Serial baud rate.
    pub baud: u32,

    /// Target angle change per jog key press.
    ///
    /// Units: degrees
    pub jog_step_deg: f64,
}
