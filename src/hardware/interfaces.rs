// Joint topology descriptor supplied by the host, and the state/command
// interfaces exported back to it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::error;

use super::error::{HalError, Result};

pub const HW_IF_POSITION: &str = "position";
pub const HW_IF_VELOCITY: &str = "velocity";

/// Interface kinds this hardware exports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceKind {
    Position,
    Velocity,
}

impl InterfaceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterfaceKind::Position => HW_IF_POSITION,
            InterfaceKind::Velocity => HW_IF_VELOCITY,
        }
    }
}

/// One joint as described by the host: its name and interface names in order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointInfo {
    pub name: String,
    #[serde(default)]
    pub command_interfaces: Vec<String>,
    #[serde(default)]
    pub state_interfaces: Vec<String>,
}

impl JointInfo {
    /// A joint with the expected velocity command and position/velocity states
    pub fn wheel(name: &str) -> Self {
        Self {
            name: name.to_string(),
            command_interfaces: vec![HW_IF_VELOCITY.to_string()],
            state_interfaces: vec![HW_IF_POSITION.to_string(), HW_IF_VELOCITY.to_string()],
        }
    }
}

/// Hardware description handed over by the host at configure time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareInfo {
    pub name: String,
    pub joints: Vec<JointInfo>,
    #[serde(default)]
    pub hardware_parameters: HashMap<String, String>,
}

impl HardwareInfo {
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn joint_names(&self) -> Vec<String> {
        self.joints.iter().map(|j| j.name.clone()).collect()
    }
}

fn topology_error(joint: &JointInfo, reason: String) -> HalError {
    error!("Joint '{}': {}", joint.name, reason);
    HalError::JointTopology {
        joint: joint.name.clone(),
        reason,
    }
}

/// Every joint needs exactly one `velocity` command interface and the
/// `position`, `velocity` state interfaces in that order. Joints come in
/// left/right pairs.
pub fn validate_topology(joints: &[JointInfo]) -> Result<()> {
    if joints.is_empty() || joints.len() % 2 != 0 {
        error!("Got {} joints, need left/right pairs", joints.len());
        return Err(HalError::UnpairedJoints {
            count: joints.len(),
        });
    }

    for joint in joints {
        if joint.command_interfaces.len() != 1 {
            return Err(topology_error(
                joint,
                format!(
                    "{} command interfaces found, 1 expected",
                    joint.command_interfaces.len()
                ),
            ));
        }

        let velocity = InterfaceKind::Velocity.as_str();
        let position = InterfaceKind::Position.as_str();

        if joint.command_interfaces[0] != velocity {
            return Err(topology_error(
                joint,
                format!(
                    "'{}' command interface found, '{}' expected",
                    joint.command_interfaces[0], velocity
                ),
            ));
        }

        if joint.state_interfaces.len() != 2 {
            return Err(topology_error(
                joint,
                format!(
                    "{} state interfaces found, 2 expected",
                    joint.state_interfaces.len()
                ),
            ));
        }

        if joint.state_interfaces[0] != position {
            return Err(topology_error(
                joint,
                format!(
                    "'{}' as first state interface, '{}' expected",
                    joint.state_interfaces[0], position
                ),
            ));
        }

        if joint.state_interfaces[1] != velocity {
            return Err(topology_error(
                joint,
                format!(
                    "'{}' as second state interface, '{}' expected",
                    joint.state_interfaces[1], velocity
                ),
            ));
        }
    }

    Ok(())
}

/// Read-only state value exported for a joint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateInterface {
    pub joint: String,
    pub kind: InterfaceKind,
    pub value: f64,
}

/// Writable command slot exported for a joint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandInterface {
    pub joint: String,
    pub kind: InterfaceKind,
}
