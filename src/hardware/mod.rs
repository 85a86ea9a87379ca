// Joint-level hardware interface for the differential-drive base
//
// Bridges the motor channel (linear units) and the host's joint interfaces
// (angular units): encoder tracking with rollover rejection, velocity
// sampling, bounded command writes and the start/stop lifecycle.

pub mod encoder;
mod error;
pub mod interfaces;
pub mod lifecycle;
pub mod session;
pub mod velocity;

pub use encoder::{EncoderTracker, ROLLOVER_THRESHOLD};
pub use error::{HalError, Result};
pub use interfaces::{
    CommandInterface, HW_IF_POSITION, HW_IF_VELOCITY, HardwareInfo, InterfaceKind, JointInfo,
    StateInterface, validate_topology,
};
pub use lifecycle::{BaseHardware, SessionStatus, SettleFn};
pub use session::{Diagnostics, HardwareSession, JointState, ReadOutcome};
pub use velocity::VelocitySampler;
