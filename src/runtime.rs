// Control loop with watchdog
// Note: the watchdog zeroes wheel commands when teleop goes quiet, so a
// crashed publisher cannot leave the base driving.

use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::{error, info, warn};

// local imports
use crate::config::{
    CMD_TIMEOUT, LOOP_HZ, MAX_LOOP_HZ, PARAM_SERIAL_PORT, TOPIC_CMD_WHEELS, TOPIC_HEALTH,
    TOPIC_STATE_JOINTS,
};
use crate::hardware::{BaseHardware, HardwareInfo, ReadOutcome};
use crate::messages::{JointStateMessage, RuntimeHealth, WheelCommand};
use crate::motor::HorizonBus;

/// Where the runtime gets its hardware description and how fast it ticks
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub config_path: PathBuf,
    pub port_override: Option<String>,
    pub loop_hz: u64,
}

impl RuntimeOptions {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            port_override: None,
            loop_hz: LOOP_HZ,
        }
    }
}

pub struct Runtime {
    latest_cmd: Option<WheelCommand>,
    cmd_received_at: Instant,
    health: RuntimeHealth,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            latest_cmd: None,
            cmd_received_at: Instant::now(),
            health: RuntimeHealth::CmdStale, // Start stale until first cmd
        }
    }

    /// Process incoming command
    fn on_command(&mut self, cmd: WheelCommand) {
        info!("Received command: {:?}", &cmd);
        self.latest_cmd = Some(cmd);
        self.cmd_received_at = Instant::now();
    }

    /// Command to apply this cycle, zero once the watchdog trips
    fn compute_command(&mut self) -> WheelCommand {
        let cmd_age = self.cmd_received_at.elapsed();

        if cmd_age > CMD_TIMEOUT {
            if self.health != RuntimeHealth::CmdStale {
                warn!("Command stale ({:?} old), stopping robot", cmd_age);
            }
            self.health = RuntimeHealth::CmdStale;
            WheelCommand::default()
        } else if let Some(cmd) = self.latest_cmd {
            self.health = RuntimeHealth::Ok;
            cmd
        } else {
            self.health = RuntimeHealth::CmdStale;
            WheelCommand::default()
        }
    }

    /// Downgrade health when the controller stopped answering
    fn on_read(&mut self, outcome: ReadOutcome) {
        if !outcome.is_complete() && self.health == RuntimeHealth::Ok {
            self.health = RuntimeHealth::HardwareStale;
        }
    }
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Tick period for a loop rate, clamped to 1..=MAX_LOOP_HZ
pub fn loop_period(loop_hz: u64) -> Duration {
    Duration::from_nanos(1_000_000_000 / loop_hz.clamp(1, MAX_LOOP_HZ))
}

/// Load the host descriptor, applying the serial port override
pub async fn load_hardware_info(options: &RuntimeOptions) -> Result<HardwareInfo, BoxError> {
    let json = tokio::fs::read_to_string(&options.config_path).await?;
    let mut info = HardwareInfo::from_json(&json)?;
    if let Some(port) = &options.port_override {
        info.hardware_parameters
            .insert(PARAM_SERIAL_PORT.to_string(), port.clone());
    }
    Ok(info)
}

pub async fn run(options: RuntimeOptions) -> Result<(), BoxError> {
    let info = load_hardware_info(&options).await?;

    // Configure and warm up before any cycle runs
    let mut hardware = BaseHardware::new(HorizonBus::new());
    tokio::task::block_in_place(|| {
        hardware.configure(&info)?;
        hardware.start()
    })?;

    let result = control_loop(&mut hardware, &options, info.joints.len()).await;
    if let Err(e) = &result {
        error!("Control loop failed: {}", e);
    }

    // Leave the wheels stopped before cooling down, however the loop ended
    if let Err(e) = hardware.halt() {
        error!("Failed to halt wheels: {}", e);
    }
    tokio::task::block_in_place(|| hardware.stop())?;

    result
}

async fn control_loop(
    hardware: &mut BaseHardware<HorizonBus>,
    options: &RuntimeOptions,
    joint_count: usize,
) -> Result<(), BoxError> {
    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let subscriber = session.declare_subscriber(TOPIC_CMD_WHEELS).await?;
    let pub_state = session.declare_publisher(TOPIC_STATE_JOINTS).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let mut runtime = Runtime::new();
    let mut tick = interval(loop_period(options.loop_hz));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        "Runtime started: {}Hz loop, {}ms watchdog timeout",
        options.loop_hz.clamp(1, MAX_LOOP_HZ),
        CMD_TIMEOUT.as_millis()
    );
    info!("Subscribed to: {}", TOPIC_CMD_WHEELS);
    info!("Publishing to: {}, {}", TOPIC_STATE_JOINTS, TOPIC_HEALTH);

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = &mut shutdown => {
                info!("Shutdown requested");
                return Ok(());
            }
        }

        // 1. Read back joint state
        let outcome = hardware.read()?;

        // 2. Drain all pending commands (non-blocking), keep latest
        while let Ok(Some(sample)) = subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<WheelCommand>(&payload) {
                Ok(cmd) => {
                    runtime.on_command(cmd);
                }
                Err(e) => {
                    warn!("Failed to parse command: {}", e);
                }
            }
        }

        // 3. Compute commands (includes watchdog logic) and write them
        let cmd = runtime.compute_command();
        runtime.on_read(outcome);
        hardware.set_commands(&cmd.per_joint(joint_count))?;
        hardware.write()?;

        // 4. Publish state and health
        let state = JointStateMessage {
            status: hardware.status(),
            joints: hardware.joint_states(),
            diagnostics: hardware.diagnostics(),
        };
        pub_state.put(serde_json::to_string(&state)?).await?;

        let health_json = serde_json::to_string(&runtime.health)?;
        pub_health.put(health_json).await?;
    }
}
