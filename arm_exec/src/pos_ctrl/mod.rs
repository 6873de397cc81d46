//! Closed-loop position control module
//!
//! Drives each joint's tracked absolute position towards a moving target by
//! emitting bounded relative move demands. Targets move in response to
//! operator jogs (in output degrees or raw steps); the controller closes the
//! loop against the multi-turn tracker's view of where the motor actually is.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use params::*;
pub use state::*;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Largest relative move demand sent in one chunk.
///
/// Units: motor ticks. Kept under the 15 bit sign-magnitude limit of the
/// goal position register.
pub const CHUNK_LIMIT: i64 = 30_000;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during PosCtrl operation.
#[derive(Debug, thiserror::Error)]
pub enum PosCtrlError {
    #[error("Failed to load parameters: {0}")]
    ParamLoadError(#[from] util::params::LoadError),

    #[error("No configuration for joint {0}")]
    UnknownJoint(servo_if::joints::JointId),

    #[error("No planar geometry configured, cannot resolve IK targets")]
    NoGeometry,

    #[error("IK target ({0}, {1}) is unreachable")]
    Unreachable(f64, f64),
}
