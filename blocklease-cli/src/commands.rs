use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::error;

use blocklease_api::{
    IpamDriver, ReleaseAddressRequest, ReleasePoolRequest, RequestAddressRequest,
    RequestPoolRequest, GATEWAY_ADDRESS_TYPE, REQUEST_ADDRESS_TYPE,
};
use blocklease_config::{BlockleaseConfig, ConfigOverrides};
use blocklease_engine::{collect_status, run_offline, run_service_mode};
use blocklease_telemetry::MetricsRecorder;

#[derive(Parser, Debug)]
#[command(name = "blocklease", version, about = "Block and address leasing for container networks")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Overrides applied on top of the file and environment configuration.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Configuration file (default: config/blocklease.yaml if present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Lease file used to save and restore state
    #[arg(long = "lease-file", global = true)]
    pub lease_file: Option<String>,

    /// Main IPv4 pool, e.g. 192.168.0.0/16
    #[arg(id = "v4_pool", long = "v4-pool", global = true)]
    pub v4: Option<String>,

    /// Prefix length of leased IPv4 blocks
    #[arg(long = "v4-block", global = true)]
    pub v4_block: Option<u8>,

    /// Main IPv6 pool, e.g. fe80::/56
    #[arg(id = "v6_pool", long = "v6-pool", global = true)]
    pub v6: Option<String>,

    /// Prefix length of leased IPv6 blocks
    #[arg(long = "v6-block", global = true)]
    pub v6_block: Option<u8>,

    /// Log level used when RUST_LOG is not set
    #[arg(long = "log-level", global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the lease service until interrupted, then save the final state
    Run(RunArgs),
    /// Print pool usage of the saved state
    Status(StatusArgs),
    /// Lease or return a block
    #[command(subcommand)]
    Pool(PoolCommand),
    /// Lease or return an address inside a leased block
    #[command(subcommand)]
    Address(AddressCommand),
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Remove the lease file before starting
    #[arg(long)]
    pub wipe: bool,

    /// Seconds between background saves
    #[arg(long = "save-interval")]
    pub save_interval: Option<u64>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct StatusArgs {
    /// Also print this process's metrics in Prometheus text format. Counters
    /// of a running service are logged when it shuts down.
    #[arg(long)]
    pub metrics: bool,
}

#[derive(Subcommand, Debug)]
pub enum PoolCommand {
    /// Lease a block
    Request {
        /// Lease from the IPv6 pool instead of IPv4
        #[arg(long)]
        v6: bool,
    },
    /// Return a leased block
    Release { pool_id: String },
}

#[derive(Subcommand, Debug)]
pub enum AddressCommand {
    /// Lease the next address of a block
    Request {
        pool_id: String,
        /// Mark the request as a gateway request
        #[arg(long)]
        gateway: bool,
    },
    /// Return an address to its block
    Release { pool_id: String, address: String },
}

impl Cli {
    pub fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::default();
        let lease = &mut overrides.lease;
        lease.file = self.global.lease_file.clone();
        lease.v4 = self.global.v4.clone();
        lease.v4_block = self.global.v4_block;
        lease.v6 = self.global.v6.clone();
        lease.v6_block = self.global.v6_block;
        if let Commands::Run(run) = &self.command {
            lease.wipe = run.wipe.then_some(true);
            lease.save_interval_secs = run.save_interval;
        }
        overrides.telemetry.log_level = self.global.log_level.clone();
        overrides
    }

    pub fn load_config(&self) -> Result<BlockleaseConfig> {
        BlockleaseConfig::load_with(self.global.config.as_deref(), &self.overrides())
            .context("Failed to load configuration")
    }
}

pub async fn run_command(
    command: Commands,
    config: BlockleaseConfig,
    metrics: MetricsRecorder,
) -> Result<()> {
    match command {
        Commands::Run(_) => {
            run_service_mode(config, metrics, shutdown_signal())
                .await
                .context("Lease service failed")?;
        }
        Commands::Status(args) => {
            let (usage, origin) = collect_status(config, metrics.clone())?;
            println!("State: {:?}", origin);
            for family in &usage.families {
                println!("{family}");
            }
            if args.metrics {
                print!("{}", metrics.gather_metrics()?);
            }
        }
        Commands::Pool(PoolCommand::Request { v6 }) => {
            let lease = run_offline(config, metrics, |driver| {
                driver.request_pool(&RequestPoolRequest {
                    v6,
                    ..Default::default()
                })
            })?;
            println!("{} {}", lease.pool_id, lease.pool);
        }
        Commands::Pool(PoolCommand::Release { pool_id }) => {
            run_offline(config, metrics, |driver| {
                driver.release_pool(&ReleasePoolRequest { pool_id })
            })?;
        }
        Commands::Address(AddressCommand::Request { pool_id, gateway }) => {
            let mut options = HashMap::new();
            if gateway {
                options.insert(REQUEST_ADDRESS_TYPE.to_string(), GATEWAY_ADDRESS_TYPE.to_string());
            }
            let lease = run_offline(config, metrics, |driver| {
                driver.request_address(&RequestAddressRequest {
                    pool_id,
                    options,
                    ..Default::default()
                })
            })?;
            println!("{}", lease.address);
        }
        Commands::Address(AddressCommand::Release { pool_id, address }) => {
            run_offline(config, metrics, |driver| {
                driver.release_address(&ReleaseAddressRequest { pool_id, address })
            })?;
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
    }
}
