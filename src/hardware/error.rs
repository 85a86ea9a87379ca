use crate::hardware::lifecycle::SessionStatus;
use crate::motor::ChannelError;

/// Errors surfaced by the hardware layer.
///
/// Everything except the lifecycle and command variants is a configuration
/// failure and keeps the system out of `Configured`. Per-cycle poll and write faults are
/// never returned; they are logged and counted in
/// [`Diagnostics`](crate::hardware::Diagnostics).
#[derive(Debug, thiserror::Error)]
pub enum HalError {
    #[error("Missing hardware parameter '{key}'")]
    MissingParameter { key: &'static str },

    #[error("Hardware parameter '{key}' is not a number: '{value}'")]
    MalformedParameter { key: &'static str, value: String },

    #[error("Hardware parameter '{key}' out of range: {value} ({expected})")]
    ParameterOutOfRange {
        key: &'static str,
        value: f64,
        expected: &'static str,
    },

    #[error("Joint '{joint}': {reason}")]
    JointTopology { joint: String, reason: String },

    #[error("Expected an even number of wheel joints (left/right pairs), got {count}")]
    UnpairedJoints { count: usize },

    #[error("Could not get encoder data to calibrate travel offset")]
    Calibration,

    #[error("Motor channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Cannot {action} while {status:?}")]
    InvalidState {
        action: &'static str,
        status: SessionStatus,
    },

    #[error("Unknown joint '{0}'")]
    UnknownJoint(String),

    #[error("Expected {expected} commands, got {got}")]
    CommandCount { expected: usize, got: usize },
}

pub type Result<T> = std::result::Result<T, HalError>;
