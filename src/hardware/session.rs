// Configured drivetrain session: parameters, joint state and the read/write
// cycles that move data between the joints and the motor channel.

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::HardwareParams;
use crate::motor::{DifferentialSpeed, MotorChannel, WheelGeometry, limit_differential_speed};

use super::encoder::EncoderTracker;
use super::error::{HalError, Result};
use super::interfaces::{
    CommandInterface, HardwareInfo, InterfaceKind, StateInterface, validate_topology,
};
use super::velocity::VelocitySampler;

/// Snapshot of one joint's state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JointState {
    pub name: String,
    pub position: f64,        // rad
    pub position_offset: f64, // rad
    pub velocity: f64,        // rad/s
}

/// Running counters for conditions that are logged but never fail a cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    pub missed_encoder_polls: u64,
    pub missed_speed_polls: u64,
    pub dropped_encoder_readings: u64,
    pub failed_writes: u64,
}

/// Which polls returned data during a read cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOutcome {
    pub encoders: bool,
    pub speeds: bool,
}

impl ReadOutcome {
    pub fn is_complete(&self) -> bool {
        self.encoders && self.speeds
    }
}

#[derive(Debug)]
pub struct HardwareSession {
    name: String,
    joints: Vec<String>,
    params: HardwareParams,
    geometry: WheelGeometry,
    encoders: EncoderTracker,
    sampler: VelocitySampler,
    commands: Vec<f64>,
    diagnostics: Diagnostics,
}

impl HardwareSession {
    /// Validate the host descriptor, connect, push limits and calibrate the
    /// travel offsets.
    ///
    /// Topology and parameters are checked before the channel is touched.
    pub fn configure<C: MotorChannel + ?Sized>(
        info: &HardwareInfo,
        channel: &mut C,
    ) -> Result<Self> {
        info!("Name: {}", info.name);
        info!("Number of joints: {}", info.joints.len());

        validate_topology(&info.joints)?;
        let params = HardwareParams::from_parameters(&info.hardware_parameters)
            .inspect_err(|e| error!("Invalid hardware parameters: {}", e))?;
        info!("Port: {}", params.serial_port);
        debug!("Hardware parameters: {:?}", params);

        let joints = info.joint_names();
        let mut session = Self {
            name: info.name.clone(),
            geometry: WheelGeometry::new(params.wheel_diameter),
            encoders: EncoderTracker::new(joints.len()),
            sampler: VelocitySampler::new(joints.len()),
            commands: vec![f64::NAN; joints.len()],
            diagnostics: Diagnostics::default(),
            joints,
            params,
        };

        channel
            .connect(&session.params.serial_port)
            .inspect_err(|e| error!("Failed to connect to {}: {}", session.params.serial_port, e))?;
        channel
            .configure_limits(session.params.max_speed, session.params.max_accel)
            .inspect_err(|e| error!("Failed to configure limits: {}", e))?;
        session.reset_travel_offset(channel)?;

        Ok(session)
    }

    /// Get current encoder travel from the controller and bias future
    /// readings against it
    fn reset_travel_offset<C: MotorChannel + ?Sized>(&mut self, channel: &mut C) -> Result<()> {
        match channel.request_encoders(self.params.polling_timeout) {
            Ok(Some(snapshot)) => {
                info!(
                    "Calibrating travel offset (L: {:.4}, R: {:.4})",
                    snapshot.left_travel, snapshot.right_travel
                );
                self.encoders.calibrate(&snapshot, &self.geometry);
                Ok(())
            }
            Ok(None) => {
                error!("Could not get encoder data to calibrate travel offset");
                Err(HalError::Calibration)
            }
            Err(e) => {
                error!("Encoder request failed during calibration: {}", e);
                Err(HalError::Channel(e))
            }
        }
    }

    /// Pull the latest travel and speed measurements into the joint state.
    ///
    /// A poll that returns nothing leaves the previous values in place.
    pub fn read_cycle<C: MotorChannel + ?Sized>(&mut self, channel: &mut C) -> ReadOutcome {
        let timeout = self.params.polling_timeout;

        let encoders = match channel.request_encoders(timeout) {
            Ok(Some(snapshot)) => {
                debug!(
                    "Received linear distance information (L: {:.4}, R: {:.4})",
                    snapshot.left_travel, snapshot.right_travel
                );
                let dropped = self.encoders.update(&snapshot, &self.geometry);
                self.diagnostics.dropped_encoder_readings += dropped as u64;
                true
            }
            Ok(None) => {
                warn!("No encoder data within {:?}, keeping previous positions", timeout);
                self.diagnostics.missed_encoder_polls += 1;
                false
            }
            Err(e) => {
                warn!("Encoder request failed: {}", e);
                self.diagnostics.missed_encoder_polls += 1;
                false
            }
        };

        let speeds = match channel.request_speeds(timeout) {
            Ok(Some(snapshot)) => {
                debug!(
                    "Received linear speed information (L: {:.4}, R: {:.4})",
                    snapshot.left_speed, snapshot.right_speed
                );
                self.sampler.update(&snapshot, &self.geometry);
                true
            }
            Ok(None) => {
                warn!("No speed data within {:?}, keeping previous velocities", timeout);
                self.diagnostics.missed_speed_polls += 1;
                false
            }
            Err(e) => {
                warn!("Speed request failed: {}", e);
                self.diagnostics.missed_speed_polls += 1;
                false
            }
        };

        for (i, name) in self.joints.iter().enumerate() {
            debug!(
                "Got position state {:.5} and velocity state {:.5} for '{}'",
                self.encoders.positions()[i],
                self.sampler.velocities()[i],
                name
            );
        }

        ReadOutcome { encoders, speeds }
    }

    /// Convert, bound and send the velocity commands of every left/right pair.
    ///
    /// Transport failures are logged and counted, never returned.
    pub fn write_cycle<C: MotorChannel + ?Sized>(&mut self, channel: &mut C) {
        let max_accel = self.params.max_accel;

        for (pair, commands) in self.commands.chunks_exact(2).enumerate() {
            let requested = DifferentialSpeed::new(
                self.geometry.angular_to_linear(commands[0]),
                self.geometry.angular_to_linear(commands[1]),
            );
            let speed = limit_differential_speed(requested, self.params.max_speed);
            if speed != requested {
                debug!(
                    "Limited pair {} from ({:.3}, {:.3}) to ({:.3}, {:.3}) m/s",
                    pair, requested.left, requested.right, speed.left, speed.right
                );
            }

            if let Err(e) = channel.control_speed(speed.left, speed.right, max_accel, max_accel) {
                warn!("Failed to send speed command for pair {}: {}", pair, e);
                self.diagnostics.failed_writes += 1;
            }
        }

        for (name, command) in self.joints.iter().zip(&self.commands) {
            debug!("Got velocity command {:.5} for '{}'", command, name);
        }
    }

    /// Zero every state and command slot that was never initialized
    pub fn seed(&mut self) {
        self.encoders.seed();
        self.sampler.seed();
        for command in self.commands.iter_mut().filter(|c| c.is_nan()) {
            *command = 0.0;
        }
    }

    pub fn set_command(&mut self, joint: &str, velocity: f64) -> Result<()> {
        let index = self
            .joints
            .iter()
            .position(|name| name == joint)
            .ok_or_else(|| HalError::UnknownJoint(joint.to_string()))?;
        self.commands[index] = velocity;
        Ok(())
    }

    pub fn set_commands(&mut self, velocities: &[f64]) -> Result<()> {
        if velocities.len() != self.commands.len() {
            return Err(HalError::CommandCount {
                expected: self.commands.len(),
                got: velocities.len(),
            });
        }
        self.commands.copy_from_slice(velocities);
        Ok(())
    }

    pub fn commands(&self) -> &[f64] {
        &self.commands
    }

    pub fn joint_states(&self) -> Vec<JointState> {
        self.joints
            .iter()
            .enumerate()
            .map(|(i, name)| JointState {
                name: name.clone(),
                position: self.encoders.positions()[i],
                position_offset: self.encoders.offsets()[i],
                velocity: self.sampler.velocities()[i],
            })
            .collect()
    }

    /// Position then velocity for every joint, in joint order
    pub fn export_state_interfaces(&self) -> Vec<StateInterface> {
        let mut interfaces = Vec::with_capacity(self.joints.len() * 2);
        for (i, name) in self.joints.iter().enumerate() {
            interfaces.push(StateInterface {
                joint: name.clone(),
                kind: InterfaceKind::Position,
                value: self.encoders.positions()[i],
            });
            interfaces.push(StateInterface {
                joint: name.clone(),
                kind: InterfaceKind::Velocity,
                value: self.sampler.velocities()[i],
            });
        }
        interfaces
    }

    pub fn export_command_interfaces(&self) -> Vec<CommandInterface> {
        self.joints
            .iter()
            .map(|name| CommandInterface {
                joint: name.clone(),
                kind: InterfaceKind::Velocity,
            })
            .collect()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn joint_names(&self) -> &[String] {
        &self.joints
    }

    pub fn params(&self) -> &HardwareParams {
        &self.params
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PARAM_MAX_SPEED, PARAM_WHEEL_DIAMETER, husky_parameters};
    use crate::hardware::interfaces::JointInfo;
    use crate::motor::channel::mock::{MockChannel, SpeedCall};
    use std::time::Duration;

    const EPS: f64 = 1e-9;

    fn husky_info(diameter: &str, max_speed: &str) -> HardwareInfo {
        let mut hardware_parameters = husky_parameters();
        hardware_parameters.insert(PARAM_WHEEL_DIAMETER.to_string(), diameter.to_string());
        hardware_parameters.insert(PARAM_MAX_SPEED.to_string(), max_speed.to_string());
        HardwareInfo {
            name: "HuskyBase".to_string(),
            joints: vec![JointInfo::wheel("left_wheel"), JointInfo::wheel("right_wheel")],
            hardware_parameters,
        }
    }

    fn configured(channel: &mut MockChannel) -> HardwareSession {
        channel.push_encoders(0.0, 0.0);
        let mut session = HardwareSession::configure(&husky_info("0.3", "1.0"), channel).unwrap();
        session.seed();
        session
    }

    #[test]
    fn test_configure_connects_and_calibrates() {
        let mut channel = MockChannel::new();
        channel.push_encoders(5.0, 5.0);
        let session = HardwareSession::configure(&husky_info("0.3", "1.0"), &mut channel).unwrap();

        assert_eq!(channel.connected_to.as_deref(), Some("/dev/prolific"));
        assert_eq!(channel.limits, Some((1.0, 5.0)));
        assert_eq!(channel.last_timeout, Some(Duration::from_millis(250)));
        for state in session.joint_states() {
            assert!((state.position_offset - 33.333_333_333).abs() < 1e-6);
            assert!(state.position.is_nan());
            assert!(state.velocity.is_nan());
        }
        assert!(session.commands().iter().all(|c| c.is_nan()));
    }

    #[test]
    fn test_configure_fails_without_encoder_data() {
        let mut channel = MockChannel::new();
        let result = HardwareSession::configure(&husky_info("0.3", "1.0"), &mut channel);
        assert!(matches!(result, Err(HalError::Calibration)));
    }

    #[test]
    fn test_configure_rejects_topology_before_connecting() {
        let mut channel = MockChannel::new();
        channel.push_encoders(0.0, 0.0);
        let mut info = husky_info("0.3", "1.0");
        info.joints[0].state_interfaces.reverse();

        let result = HardwareSession::configure(&info, &mut channel);
        assert!(matches!(result, Err(HalError::JointTopology { .. })));
        assert!(channel.connected_to.is_none());
    }

    #[test]
    fn test_configure_reports_connect_failure() {
        let mut channel = MockChannel::new();
        channel.fail_connect = true;
        let result = HardwareSession::configure(&husky_info("0.3", "1.0"), &mut channel);
        assert!(matches!(result, Err(HalError::Channel(_))));
    }

    #[test]
    fn test_configure_reports_limit_failure() {
        let mut channel = MockChannel::new();
        channel.push_encoders(0.0, 0.0);
        channel.fail_limits = true;
        let result = HardwareSession::configure(&husky_info("0.3", "1.0"), &mut channel);
        assert!(matches!(result, Err(HalError::Channel(_))));
        // Calibration never ran
        assert_eq!(channel.encoders.len(), 1);
    }

    #[test]
    fn test_configure_reports_calibration_transport_failure() {
        let mut channel = MockChannel::new();
        channel.fail_requests = true;
        let result = HardwareSession::configure(&husky_info("0.3", "1.0"), &mut channel);
        assert!(matches!(result, Err(HalError::Channel(_))));
    }

    #[test]
    fn test_write_passes_slow_commands_through() {
        let mut channel = MockChannel::new();
        let mut session = configured(&mut channel);
        session.set_commands(&[2.0, 1.0]).unwrap();
        session.write_cycle(&mut channel);

        assert_eq!(channel.speed_calls.len(), 1);
        let call = channel.speed_calls[0];
        assert!((call.left - 0.3).abs() < EPS);
        assert!((call.right - 0.15).abs() < EPS);
        assert_eq!(call.accel, 5.0);
        assert_eq!(call.decel, 5.0);
    }

    #[test]
    fn test_write_limits_fast_commands() {
        let mut channel = MockChannel::new();
        let mut session = configured(&mut channel);
        session.set_commands(&[10.0, 5.0]).unwrap();
        session.write_cycle(&mut channel);

        let call = channel.speed_calls[0];
        assert!((call.left - 1.0).abs() < EPS);
        assert!((call.right - 0.5).abs() < EPS);
    }

    #[test]
    fn test_write_sends_every_pair() {
        let mut channel = MockChannel::new();
        channel.push_encoders(0.0, 0.0);
        let mut info = husky_info("0.3", "1.0");
        info.joints = vec![
            JointInfo::wheel("front_left_wheel"),
            JointInfo::wheel("front_right_wheel"),
            JointInfo::wheel("rear_left_wheel"),
            JointInfo::wheel("rear_right_wheel"),
        ];
        let mut session = HardwareSession::configure(&info, &mut channel).unwrap();
        session.seed();
        session.set_commands(&[2.0, 1.0, -2.0, -1.0]).unwrap();
        session.write_cycle(&mut channel);

        assert_eq!(channel.speed_calls.len(), 2);
        assert!((channel.speed_calls[1].left + 0.3).abs() < EPS);
        assert!((channel.speed_calls[1].right + 0.15).abs() < EPS);
    }

    #[test]
    fn test_write_failure_is_counted_not_returned() {
        let mut channel = MockChannel::new();
        let mut session = configured(&mut channel);
        channel.fail_control = true;
        session.write_cycle(&mut channel);
        session.write_cycle(&mut channel);
        assert_eq!(session.diagnostics().failed_writes, 2);
        assert_eq!(channel.speed_calls, Vec::<SpeedCall>::new());
    }

    #[test]
    fn test_read_updates_positions_and_velocities() {
        let mut channel = MockChannel::new();
        let mut session = configured(&mut channel);
        channel.push_encoders(0.03, 0.06);
        channel.push_speeds(0.3, -0.15);

        let outcome = session.read_cycle(&mut channel);
        assert!(outcome.is_complete());

        let states = session.joint_states();
        assert!((states[0].position - 0.2).abs() < EPS);
        assert!((states[1].position - 0.4).abs() < EPS);
        assert!((states[0].velocity - 2.0).abs() < EPS);
        assert!((states[1].velocity + 1.0).abs() < EPS);
    }

    #[test]
    fn test_read_keeps_state_without_data() {
        let mut channel = MockChannel::new();
        let mut session = configured(&mut channel);
        channel.push_encoders(0.03, 0.03);
        channel.push_speeds(0.3, 0.3);
        session.read_cycle(&mut channel);
        let before = session.joint_states();

        let outcome = session.read_cycle(&mut channel);
        assert_eq!(
            outcome,
            ReadOutcome {
                encoders: false,
                speeds: false
            }
        );
        assert_eq!(session.joint_states(), before);
        assert_eq!(session.diagnostics().missed_encoder_polls, 1);
        assert_eq!(session.diagnostics().missed_speed_polls, 1);
    }

    #[test]
    fn test_read_treats_transport_errors_as_missed_polls() {
        let mut channel = MockChannel::new();
        let mut session = configured(&mut channel);
        channel.push_encoders(0.03, 0.06);
        channel.push_speeds(0.3, -0.15);
        session.read_cycle(&mut channel);
        let before = session.joint_states();

        channel.fail_requests = true;
        channel.push_encoders(0.9, 0.9);
        channel.push_speeds(0.9, 0.9);
        for _ in 0..2 {
            let outcome = session.read_cycle(&mut channel);
            assert!(!outcome.encoders);
            assert!(!outcome.speeds);
        }
        assert_eq!(session.joint_states(), before);
        assert_eq!(session.diagnostics().missed_encoder_polls, 2);
        assert_eq!(session.diagnostics().missed_speed_polls, 2);
        assert_eq!(session.diagnostics().dropped_encoder_readings, 0);

        // Recovers once the link is back
        channel.fail_requests = false;
        assert!(session.read_cycle(&mut channel).is_complete());
        assert!((session.joint_states()[0].velocity - 6.0).abs() < EPS);
    }

    #[test]
    fn test_read_counts_rollover() {
        let mut channel = MockChannel::new();
        let mut session = configured(&mut channel);
        channel.push_encoders(0.3, 0.0);
        session.read_cycle(&mut channel);

        let states = session.joint_states();
        assert_eq!(states[0].position, 0.0);
        assert!((states[0].position_offset - 2.0).abs() < EPS);
        assert_eq!(session.diagnostics().dropped_encoder_readings, 1);
    }

    #[test]
    fn test_identical_reads_are_idempotent() {
        let mut channel = MockChannel::new();
        channel.push_encoders(5.0, 5.0);
        let mut session = HardwareSession::configure(&husky_info("0.3", "1.0"), &mut channel).unwrap();
        session.seed();
        for _ in 0..3 {
            channel.push_encoders(5.0, 5.0);
        }
        for _ in 0..3 {
            session.read_cycle(&mut channel);
            for state in session.joint_states() {
                assert_eq!(state.position, 0.0);
                assert!((state.position_offset - 33.333_333_333).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_set_command_by_name() {
        let mut channel = MockChannel::new();
        let mut session = configured(&mut channel);
        session.set_command("right_wheel", 1.5).unwrap();
        assert_eq!(session.commands(), &[0.0, 1.5]);
        assert!(matches!(
            session.set_command("caster", 1.0),
            Err(HalError::UnknownJoint(_))
        ));
        assert!(matches!(
            session.set_commands(&[1.0]),
            Err(HalError::CommandCount {
                expected: 2,
                got: 1
            })
        ));
    }

    #[test]
    fn test_exported_interfaces() {
        let mut channel = MockChannel::new();
        let session = configured(&mut channel);

        let states = session.export_state_interfaces();
        let layout: Vec<(&str, InterfaceKind)> =
            states.iter().map(|s| (s.joint.as_str(), s.kind)).collect();
        assert_eq!(
            layout,
            vec![
                ("left_wheel", InterfaceKind::Position),
                ("left_wheel", InterfaceKind::Velocity),
                ("right_wheel", InterfaceKind::Position),
                ("right_wheel", InterfaceKind::Velocity),
            ]
        );

        let commands = session.export_command_interfaces();
        assert_eq!(commands.len(), 2);
        assert!(commands.iter().all(|c| c.kind == InterfaceKind::Velocity));
    }
}
