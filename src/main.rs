use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use husky_zenoh_base::config::{LOOP_HZ, MAX_LOOP_HZ};
use husky_zenoh_base::runtime::{self, RuntimeOptions};

/// Run the Husky base hardware interface as a zenoh node
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Hardware description (JSON: name, joints, hardware_parameters)
    #[arg(short, long)]
    config: PathBuf,

    /// Serial port, overriding `serial_port` from the config
    #[arg(short, long)]
    port: Option<String>,

    /// Control loop rate
    #[arg(long, default_value_t = LOOP_HZ,
          value_parser = clap::value_parser!(u64).range(1..=MAX_LOOP_HZ))]
    hz: u64,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    let args = Args::parse();
    let options = RuntimeOptions {
        config_path: args.config,
        port_override: args.port,
        loop_hz: args.hz,
    };

    if let Err(e) = runtime::run(options).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
