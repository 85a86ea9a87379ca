// Define message types for the runtime

use serde::{Deserialize, Serialize};

use crate::hardware::{Diagnostics, JointState, SessionStatus};
use crate::motor::LEFT;

// Command from teleop/scripts -> runtime
// Wheel velocities in rad/s, applied to every left/right joint pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WheelCommand {
    pub left: f64,
    pub right: f64,
}

impl WheelCommand {
    pub fn new(left: f64, right: f64) -> Self {
        Self { left, right }
    }

    /// Expand into one velocity per joint (even = left, odd = right)
    pub fn per_joint(&self, joints: usize) -> Vec<f64> {
        (0..joints)
            .map(|i| if i % 2 == LEFT { self.left } else { self.right })
            .collect()
    }
}

// Joint state published by runtime -> consumers
#[derive(Debug, Clone, Serialize)]
pub struct JointStateMessage {
    pub status: SessionStatus,
    pub joints: Vec<JointState>,
    pub diagnostics: Diagnostics,
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
    HardwareStale,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_joint_interleaves_sides() {
        let cmd = WheelCommand::new(1.0, -2.0);
        assert_eq!(cmd.per_joint(4), vec![1.0, -2.0, 1.0, -2.0]);
        assert!(cmd.per_joint(0).is_empty());
    }

    #[test]
    fn test_command_json() {
        let cmd: WheelCommand = serde_json::from_str(r#"{"left": 0.5, "right": 0.25}"#).unwrap();
        assert_eq!(cmd, WheelCommand::new(0.5, 0.25));
        assert_eq!(
            serde_json::to_string(&RuntimeHealth::HardwareStale).unwrap(),
            "\"hardware_stale\""
        );
    }
}
