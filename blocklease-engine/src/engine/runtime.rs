//! Lease runtime: builds the allocator at startup, keeps it persisted while
//! running and writes the final snapshot on shutdown.
use std::io::ErrorKind;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use blocklease_api::LeaseDriver;
use blocklease_config::BlockleaseConfig;
use blocklease_core::alloc::AllocatorUsage;
use blocklease_core::{BlockAllocator, PoolSpec, SaveOutcome, SnapshotError, SnapshotStore};
use blocklease_telemetry::{LeaseLogger, MetricsRecorder};

use super::error::EngineError;

/// Where the running allocator state came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupOrigin {
    Restored,
    Fresh,
}

/// Running periodic saver. Pass it back to [`IpamRuntime::shutdown`].
#[derive(Debug)]
pub struct SaverHandle {
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Owns the allocator, its snapshot store and metrics for one process.
#[derive(Debug)]
pub struct IpamRuntime {
    config: Arc<BlockleaseConfig>,
    allocator: Arc<BlockAllocator>,
    store: Arc<SnapshotStore>,
    pub metrics: MetricsRecorder,
    origin: StartupOrigin,
}

impl IpamRuntime {
    /// Wipes the snapshot if configured, then restores from it. Any restore
    /// failure falls back to an allocator built from the configured pools;
    /// only a failure of that construction is fatal.
    #[instrument(skip_all, fields(file = %config.lease.file))]
    pub fn bootstrap(
        config: BlockleaseConfig,
        metrics: MetricsRecorder,
    ) -> Result<Self, EngineError> {
        let store = SnapshotStore::new(config.lease.file_path())?;

        if config.lease.wipe && store.wipe()? {
            info!("Existing lease file removed on request");
        }

        let (allocator, origin) = match store.restore() {
            Ok(allocator) => (allocator, StartupOrigin::Restored),
            Err(e) => {
                match &e {
                    SnapshotError::Io { source, .. } if source.kind() == ErrorKind::NotFound => {
                        info!("No lease file found, starting from configuration")
                    }
                    e if e.is_corrupt() => {
                        error!("Lease file is corrupt, starting from configuration: {e}")
                    }
                    e => warn!("Lease file unreadable, starting from configuration: {e}"),
                }
                (Self::fresh(&config)?, StartupOrigin::Fresh)
            }
        };

        Ok(Self {
            config: Arc::new(config),
            allocator: Arc::new(allocator),
            store: Arc::new(store),
            metrics,
            origin,
        })
    }

    fn fresh(config: &BlockleaseConfig) -> Result<BlockAllocator, EngineError> {
        let lease = &config.lease;
        let allocator = BlockAllocator::new(
            PoolSpec::new(&lease.v4, lease.v4_block),
            PoolSpec::new(&lease.v6, lease.v6_block),
        )?;
        Ok(allocator)
    }

    pub fn config(&self) -> &BlockleaseConfig {
        &self.config
    }

    pub fn allocator(&self) -> &Arc<BlockAllocator> {
        &self.allocator
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn origin(&self) -> StartupOrigin {
        self.origin
    }

    /// Driver for a protocol adapter, sharing this runtime's allocator and metrics.
    pub fn driver(&self) -> LeaseDriver {
        LeaseDriver::new(self.allocator.clone()).with_metrics(self.metrics.clone())
    }

    /// Current usage, also pushed to the metric gauges.
    pub fn usage(&self) -> AllocatorUsage {
        let usage = self.allocator.usage();
        self.metrics.record_usage(&usage);
        usage
    }

    pub fn log_summary(&self) {
        LeaseLogger::pool_summary(&self.usage());
    }

    /// Synchronous save, recorded in metrics.
    pub fn save(&self) -> Result<SaveOutcome, EngineError> {
        let result = self.store.save(&self.allocator);
        self.metrics.record_save_stats(self.store.stats());
        Ok(result?)
    }

    /// Spawns the periodic saver on the current tokio runtime.
    pub fn start_saver(&self) -> SaverHandle {
        let (cancel, rx) = watch::channel(false);
        let store = self.store.clone();
        let allocator = self.allocator.clone();
        let period = self.config.lease.save_interval();
        let task = tokio::spawn(async move {
            store.run_saver(&allocator, period, rx).await;
        });
        debug!(period_secs = period.as_secs(), "Snapshot saver spawned");
        SaverHandle { cancel, task }
    }

    /// Stops the saver and writes the final snapshot.
    #[instrument(skip_all)]
    pub async fn shutdown(&self, saver: SaverHandle) -> Result<SaveOutcome, EngineError> {
        // The task may already have exited if its receiver was dropped.
        let _ = saver.cancel.send(true);
        saver.task.await?;
        let outcome = self.save()?;
        info!(?outcome, "Final snapshot saved");
        self.log_activity();
        Ok(outcome)
    }

    /// Logs the lease and snapshot counters accumulated by this process.
    pub fn log_activity(&self) {
        let m = &self.metrics;
        let block_leases: u64 = ["v4", "v6"]
            .into_iter()
            .map(|family| m.block_leases.with_label_values(&[family]).get())
            .sum();
        info!(
            block_leases,
            block_returns = m.block_returns.get(),
            address_leases = m.address_leases.get(),
            address_returns = m.address_returns.get(),
            snapshot_writes = m.snapshot_writes.get(),
            snapshot_unchanged = m.snapshot_unchanged.get(),
            snapshot_failures = m.snapshot_failures.get(),
            "Lease activity"
        );
    }
}
