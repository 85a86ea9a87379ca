// Lifecycle state machine for one drivetrain
//
//   Unconfigured --configure--> Configured --start--> Started <--start/stop--> Stopped
//
// `read`/`write` are only accepted while `Started`. Start and stop block the
// calling thread for the configured settle time before switching state, so
// no cycle can run during hardware warm-up or cool-down.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::motor::MotorChannel;

use super::error::{HalError, Result};
use super::interfaces::{CommandInterface, HardwareInfo, StateInterface};
use super::session::{Diagnostics, HardwareSession, JointState, ReadOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Unconfigured,
    Configured,
    Started,
    Stopped,
}

/// Blocking wait used for warm-up and cool-down
pub type SettleFn = Box<dyn Fn(Duration) + Send>;

/// Hardware component handed to the host: one instance per drivetrain
pub struct BaseHardware<C: MotorChannel> {
    channel: C,
    status: SessionStatus,
    session: Option<HardwareSession>,
    settle: SettleFn,
}

impl<C: MotorChannel> BaseHardware<C> {
    pub fn new(channel: C) -> Self {
        Self {
            channel,
            status: SessionStatus::Unconfigured,
            session: None,
            settle: Box::new(std::thread::sleep),
        }
    }

    /// Replace the blocking settle wait
    pub fn with_settle(mut self, settle: SettleFn) -> Self {
        self.settle = settle;
        self
    }

    pub fn configure(&mut self, info: &HardwareInfo) -> Result<()> {
        self.require("configure", &[SessionStatus::Unconfigured])?;

        let session = HardwareSession::configure(info, &mut self.channel)?;
        info!("Hardware '{}' configured", session.name());
        self.session = Some(session);
        self.status = SessionStatus::Configured;
        Ok(())
    }

    pub fn start(&mut self) -> Result<()> {
        self.require("start", &[SessionStatus::Configured, SessionStatus::Stopped])?;

        info!("Starting ...please wait...");
        let seconds = self.session()?.params().hw_start_sec;
        self.countdown(seconds);

        // first start: anything never read or commanded becomes zero
        self.session_mut()?.seed();

        self.status = SessionStatus::Started;
        info!("System successfully started!");
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        self.require("stop", &[SessionStatus::Started])?;

        info!("Stopping ...please wait...");
        let seconds = self.session()?.params().hw_stop_sec;
        self.countdown(seconds);

        self.status = SessionStatus::Stopped;
        info!("System successfully stopped!");
        Ok(())
    }

    pub fn read(&mut self) -> Result<ReadOutcome> {
        self.require("read", &[SessionStatus::Started])?;
        let session = self.session.as_mut().ok_or(HalError::InvalidState {
            action: "read",
            status: self.status,
        })?;
        Ok(session.read_cycle(&mut self.channel))
    }

    pub fn write(&mut self) -> Result<()> {
        self.require("write", &[SessionStatus::Started])?;
        let session = self.session.as_mut().ok_or(HalError::InvalidState {
            action: "write",
            status: self.status,
        })?;
        session.write_cycle(&mut self.channel);
        Ok(())
    }

    /// Command zero on every wheel and push it out. Does nothing unless
    /// `Started`.
    pub fn halt(&mut self) -> Result<()> {
        if self.status != SessionStatus::Started {
            return Ok(());
        }
        let session = self.session_mut()?;
        let zeros = vec![0.0; session.joint_names().len()];
        session.set_commands(&zeros)?;
        info!("Halting wheels");
        self.write()
    }

    pub fn set_command(&mut self, joint: &str, velocity: f64) -> Result<()> {
        self.session_mut()?.set_command(joint, velocity)
    }

    pub fn set_commands(&mut self, velocities: &[f64]) -> Result<()> {
        self.session_mut()?.set_commands(velocities)
    }

    pub fn export_state_interfaces(&self) -> Result<Vec<StateInterface>> {
        Ok(self.session()?.export_state_interfaces())
    }

    pub fn export_command_interfaces(&self) -> Result<Vec<CommandInterface>> {
        Ok(self.session()?.export_command_interfaces())
    }

    /// Joint states, empty until configured
    pub fn joint_states(&self) -> Vec<JointState> {
        self.session
            .as_ref()
            .map(HardwareSession::joint_states)
            .unwrap_or_default()
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.session
            .as_ref()
            .map(HardwareSession::diagnostics)
            .unwrap_or_default()
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn session(&self) -> Result<&HardwareSession> {
        self.session.as_ref().ok_or(HalError::InvalidState {
            action: "access session",
            status: self.status,
        })
    }

    fn session_mut(&mut self) -> Result<&mut HardwareSession> {
        self.session.as_mut().ok_or(HalError::InvalidState {
            action: "access session",
            status: self.status,
        })
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    fn require(&self, action: &'static str, allowed: &[SessionStatus]) -> Result<()> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            warn!("Cannot {} while {:?}", action, self.status);
            Err(HalError::InvalidState {
                action,
                status: self.status,
            })
        }
    }

    /// Wait whole seconds, reporting progress once per second
    fn countdown(&self, seconds: f64) {
        let ticks = seconds.ceil() as u64;
        for tick in 1..=ticks {
            (self.settle)(Duration::from_secs(1));
            info!("{:.1} seconds left...", (seconds - tick as f64).max(0.0));
        }
    }
}
