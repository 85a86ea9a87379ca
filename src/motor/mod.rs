// Motor control module for the Husky differential-drive base
//
// Provides:
// - Wheel kinematics (linear <-> angular units, differential speed limiting)
// - Hardware channel contract to the motor controller
// - Horizon serial protocol implementation of that channel

pub mod channel;
pub mod horizon;
pub mod kinematics;

pub use channel::{EncoderSnapshot, LEFT, MotorChannel, RIGHT, SpeedSnapshot};
pub use horizon::{ChannelError, HorizonBus};
pub use kinematics::{DifferentialSpeed, WheelGeometry, limit_differential_speed};
