//! ## blocklease-cli
//! **Operational interface for the block lease service**
//!
//! `run` keeps the allocator alive and persisted until interrupted; the
//! other commands restore the saved state, act once and save it again.

use anyhow::{Context, Result};
use blocklease_telemetry::{LeaseLogger, MetricsRecorder};
use clap::Parser;

mod commands;

use commands::{run_command, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    LeaseLogger::init(&config.telemetry.log_level)
        .map_err(|e| anyhow::anyhow!(e))
        .context("Failed to install logger")?;
    let metrics = MetricsRecorder::new().context("Failed to register metrics")?;

    run_command(cli.command, config, metrics).await
}
