// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Litter-Robot Stats Collector CLI
//!
//! # Usage
//!
//! ```bash
//! # Run with config.yaml from the working directory
//! litter-collector
//!
//! # Explicit config file and verbose logs
//! litter-collector --config /etc/litter-collector.yaml --log-level debug
//!
//! # Exercise the InfluxDB side without cloud credentials
//! litter-collector --mock
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use litter_collector::{service, Configuration, MockDeviceApi, RobotState};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Build version, overridable at compile time.
const VERSION: &str = match option_env!("BUILD_VERSION") {
    Some(v) => v,
    None => env!("CARGO_PKG_VERSION"),
};

#[derive(Parser, Debug)]
#[command(name = "litter-collector")]
#[command(about = "Collects Litter-Robot telemetry into InfluxDB", long_about = None)]
#[command(disable_version_flag = true)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Print the build version and exit
    #[arg(long)]
    version: bool,

    /// Log filter (trace, debug, info, warn, error, or RUST_LOG syntax)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Serve a simulated robot instead of calling the device cloud
    #[arg(long)]
    mock: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.version {
        println!("{}", VERSION);
        return Ok(());
    }

    // Initialize logging
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = Configuration::from_file(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;

    tracing::info!("Litter-Robot Stats Collector v{} starting...", VERSION);
    tracing::info!("  Config: {}", args.config.display());
    tracing::info!("  Database: {}", config.time_series_db.address);
    tracing::info!("  Measurement: {}", config.time_series_db.measurement());
    tracing::info!("  Interval: {}s", config.polling.interval_seconds);

    if args.mock {
        tracing::info!("Running with mock device API");
        service::run_with_api(config, MockDeviceApi::new(vec![demo_robot()])).await?;
    } else {
        service::run(config).await?;
    }

    Ok(())
}

fn demo_robot() -> RobotState {
    RobotState {
        serial: "LR3C000000".into(),
        name: "Demo".into(),
        device_id: "mock-0".into(),
        power_status: "AC".into(),
        cycle_count: 4.0,
        cycles_until_full: 26.0,
        dfi_cycle_count: 0.0,
        cycles_after_drawer_full: 0.0,
        cycle_capacity: 30.0,
        clean_cycle_wait_minutes: 7.0,
        unit_status: 0.0,
        ..RobotState::default()
    }
}
