// Timeouts, topics, hardware parameters
use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;

use crate::hardware::{HalError, Result};

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;
pub const MAX_LOOP_HZ: u64 = 1000;

// Command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topics
pub const TOPIC_CMD_WHEELS: &str = "husky/cmd/wheels"; // wheel velocity commands
pub const TOPIC_STATE_JOINTS: &str = "husky/state/joints"; // joint states
pub const TOPIC_HEALTH: &str = "husky/state/health"; // health status

// Hardware parameter keys
pub const PARAM_START_DURATION: &str = "hw_start_duration_sec";
pub const PARAM_STOP_DURATION: &str = "hw_stop_duration_sec";
pub const PARAM_WHEEL_DIAMETER: &str = "wheel_diameter";
pub const PARAM_MAX_ACCEL: &str = "max_accel";
pub const PARAM_MAX_SPEED: &str = "max_speed";
pub const PARAM_POLLING_TIMEOUT: &str = "polling_timeout";
pub const PARAM_SERIAL_PORT: &str = "serial_port";

/// Drivetrain parameters, fixed once configured
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HardwareParams {
    pub hw_start_sec: f64,
    pub hw_stop_sec: f64,
    pub wheel_diameter: f64, // m
    pub max_accel: f64,      // m/s^2
    pub max_speed: f64,      // m/s
    pub polling_timeout: Duration,
    pub serial_port: String,
}

fn required<'a>(params: &'a HashMap<String, String>, key: &'static str) -> Result<&'a str> {
    params
        .get(key)
        .map(|v| v.trim())
        .ok_or(HalError::MissingParameter { key })
}

fn decimal(params: &HashMap<String, String>, key: &'static str) -> Result<f64> {
    let raw = required(params, key)?;
    let value: f64 = raw.parse().map_err(|_| HalError::MalformedParameter {
        key,
        value: raw.to_string(),
    })?;
    if !value.is_finite() {
        return Err(HalError::ParameterOutOfRange {
            key,
            value,
            expected: "finite",
        });
    }
    Ok(value)
}

fn non_negative(params: &HashMap<String, String>, key: &'static str) -> Result<f64> {
    let value = decimal(params, key)?;
    if value < 0.0 {
        return Err(HalError::ParameterOutOfRange {
            key,
            value,
            expected: ">= 0",
        });
    }
    Ok(value)
}

impl HardwareParams {
    /// Parse the string-keyed hardware parameters from the host descriptor
    pub fn from_parameters(params: &HashMap<String, String>) -> Result<Self> {
        let wheel_diameter = decimal(params, PARAM_WHEEL_DIAMETER)?;
        if wheel_diameter <= 0.0 {
            return Err(HalError::ParameterOutOfRange {
                key: PARAM_WHEEL_DIAMETER,
                value: wheel_diameter,
                expected: "> 0",
            });
        }

        let serial_port = required(params, PARAM_SERIAL_PORT)?;
        if serial_port.is_empty() {
            return Err(HalError::MissingParameter {
                key: PARAM_SERIAL_PORT,
            });
        }

        let timeout = non_negative(params, PARAM_POLLING_TIMEOUT)?;
        let polling_timeout =
            Duration::try_from_secs_f64(timeout).map_err(|_| HalError::ParameterOutOfRange {
                key: PARAM_POLLING_TIMEOUT,
                value: timeout,
                expected: "representable as a duration",
            })?;

        Ok(Self {
            hw_start_sec: non_negative(params, PARAM_START_DURATION)?,
            hw_stop_sec: non_negative(params, PARAM_STOP_DURATION)?,
            wheel_diameter,
            max_accel: non_negative(params, PARAM_MAX_ACCEL)?,
            max_speed: non_negative(params, PARAM_MAX_SPEED)?,
            polling_timeout,
            serial_port: serial_port.to_string(),
        })
    }
}

/// Parameters of a stock Husky, for tests
#[cfg(test)]
pub(crate) fn husky_parameters() -> HashMap<String, String> {
    [
        (PARAM_START_DURATION, "2"),
        (PARAM_STOP_DURATION, "3.0"),
        (PARAM_WHEEL_DIAMETER, "0.3302"),
        (PARAM_MAX_ACCEL, "5.0"),
        (PARAM_MAX_SPEED, "1.0"),
        (PARAM_POLLING_TIMEOUT, "0.25"),
        (PARAM_SERIAL_PORT, "/dev/prolific"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}
