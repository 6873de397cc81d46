//! # Arm Executable Library
//!
//! Modules shared by the arm executable and its companion test binaries.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

/// Multi-turn absolute position tracking.
pub mod joint_track;

/// Closed-loop position control module.
pub mod pos_ctrl;

/// Telemetry records for archiving servo state.
pub mod telem;

/// Key bindings for the teleoperation loops.
pub mod teleop;

/// Parameters for the arm executable.
pub mod params;
