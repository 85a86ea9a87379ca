// Request/response contract with the drivetrain motor controller
//
// All values crossing this boundary are SI linear units (m, m/s, m/s^2).

use std::time::Duration;

use super::horizon::ChannelError;

pub const LEFT: usize = 0;
pub const RIGHT: usize = 1;

/// Cumulative wheel travel reported by the encoders, in metres
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EncoderSnapshot {
    pub left_travel: f64,
    pub right_travel: f64,
}

impl EncoderSnapshot {
    pub fn new(left_travel: f64, right_travel: f64) -> Self {
        Self {
            left_travel,
            right_travel,
        }
    }

    /// Travel for a side index (`LEFT` or `RIGHT`)
    pub fn travel(&self, side: usize) -> f64 {
        if side == LEFT {
            self.left_travel
        } else {
            self.right_travel
        }
    }
}

/// Measured wheel speeds, in m/s
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpeedSnapshot {
    pub left_speed: f64,
    pub right_speed: f64,
}

impl SpeedSnapshot {
    pub fn new(left_speed: f64, right_speed: f64) -> Self {
        Self {
            left_speed,
            right_speed,
        }
    }
}

/// Hardware channel to a differential-drive motor controller.
///
/// `request_*` calls block for at most `timeout`. A timeout is reported as
/// `Ok(None)`; `Err` is reserved for transport faults.
pub trait MotorChannel {
    fn connect(&mut self, port: &str) -> Result<(), ChannelError>;

    fn configure_limits(&mut self, max_speed: f64, max_accel: f64) -> Result<(), ChannelError>;

    fn request_encoders(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<EncoderSnapshot>, ChannelError>;

    fn request_speeds(&mut self, timeout: Duration) -> Result<Option<SpeedSnapshot>, ChannelError>;

    fn control_speed(
        &mut self,
        left: f64,
        right: f64,
        accel: f64,
        decel: f64,
    ) -> Result<(), ChannelError>;
}
