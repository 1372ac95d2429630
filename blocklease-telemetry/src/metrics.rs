//! ## blocklease-telemetry::metrics
//! **Prometheus registry for lease activity and pool usage**

use blocklease_core::alloc::AllocatorUsage;
use blocklease_core::snapshot::SaveStats;
use blocklease_core::Family;
use prometheus::{GaugeVec, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry};

#[derive(Clone)]
pub struct MetricsRecorder {
    pub registry: Registry,
    pub block_leases: IntCounterVec,
    pub block_returns: IntCounter,
    pub address_leases: IntCounter,
    pub address_returns: IntCounter,
    pub lease_failures: IntCounterVec,
    pub snapshot_writes: IntCounter,
    pub snapshot_unchanged: IntCounter,
    pub snapshot_failures: IntCounter,
    pub pool_blocks: GaugeVec,
    pub blocks: IntGaugeVec,
    pub leased_addresses: IntGaugeVec,
}

impl std::fmt::Debug for MetricsRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRecorder").finish_non_exhaustive()
    }
}

fn label(family: Family) -> &'static str {
    match family {
        Family::V4 => "v4",
        Family::V6 => "v6",
    }
}

impl MetricsRecorder {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let block_leases = IntCounterVec::new(
            Opts::new("blocklease_block_leases_total", "Blocks handed out"),
            &["family"],
        )?;
        let block_returns =
            IntCounter::new("blocklease_block_returns_total", "Blocks returned")?;
        let address_leases =
            IntCounter::new("blocklease_address_leases_total", "Addresses handed out")?;
        let address_returns =
            IntCounter::new("blocklease_address_returns_total", "Addresses returned")?;
        let lease_failures = IntCounterVec::new(
            Opts::new("blocklease_lease_failures_total", "Rejected lease operations"),
            &["operation"],
        )?;
        let snapshot_writes =
            IntCounter::new("blocklease_snapshot_writes_total", "Snapshots written")?;
        let snapshot_unchanged = IntCounter::new(
            "blocklease_snapshot_unchanged_total",
            "Saves skipped because nothing changed",
        )?;
        let snapshot_failures =
            IntCounter::new("blocklease_snapshot_failures_total", "Failed snapshot saves")?;
        let pool_blocks = GaugeVec::new(
            Opts::new("blocklease_pool_blocks", "Blocks a pool can yield"),
            &["family"],
        )?;
        let blocks = IntGaugeVec::new(
            Opts::new("blocklease_blocks", "Blocks by state"),
            &["family", "state"],
        )?;
        let leased_addresses = IntGaugeVec::new(
            Opts::new("blocklease_leased_addresses", "Addresses currently leased"),
            &["family"],
        )?;

        registry.register(Box::new(block_leases.clone()))?;
        registry.register(Box::new(block_returns.clone()))?;
        registry.register(Box::new(address_leases.clone()))?;
        registry.register(Box::new(address_returns.clone()))?;
        registry.register(Box::new(lease_failures.clone()))?;
        registry.register(Box::new(snapshot_writes.clone()))?;
        registry.register(Box::new(snapshot_unchanged.clone()))?;
        registry.register(Box::new(snapshot_failures.clone()))?;
        registry.register(Box::new(pool_blocks.clone()))?;
        registry.register(Box::new(blocks.clone()))?;
        registry.register(Box::new(leased_addresses.clone()))?;

        Ok(Self {
            registry,
            block_leases,
            block_returns,
            address_leases,
            address_returns,
            lease_failures,
            snapshot_writes,
            snapshot_unchanged,
            snapshot_failures,
            pool_blocks,
            blocks,
            leased_addresses,
        })
    }

    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    pub fn inc_block_leases(&self, family: Family) {
        self.block_leases.with_label_values(&[label(family)]).inc();
    }

    pub fn inc_block_returns(&self) {
        self.block_returns.inc();
    }

    pub fn inc_address_leases(&self) {
        self.address_leases.inc();
    }

    pub fn inc_address_returns(&self) {
        self.address_returns.inc();
    }

    pub fn inc_failures(&self, operation: &str) {
        self.lease_failures.with_label_values(&[operation]).inc();
    }

    /// Replaces the per-family gauges with current usage.
    pub fn record_usage(&self, usage: &AllocatorUsage) {
        for u in &usage.families {
            let family = label(u.family);
            self.pool_blocks
                .with_label_values(&[family])
                .set(u.block_count as f64);
            self.blocks
                .with_label_values(&[family, "allocated"])
                .set(u.allocated_blocks as i64);
            self.blocks
                .with_label_values(&[family, "free"])
                .set(u.free_blocks as i64);
            self.blocks
                .with_label_values(&[family, "derived"])
                .set(u.derived_blocks.min(i64::MAX as u64) as i64);
            self.leased_addresses
                .with_label_values(&[family])
                .set(u.allocated_addresses as i64);
        }
    }

    /// Advances the snapshot counters to the store's running totals.
    pub fn record_save_stats(&self, stats: &SaveStats) {
        catch_up(&self.snapshot_writes, stats.writes());
        catch_up(&self.snapshot_unchanged, stats.unchanged());
        catch_up(&self.snapshot_failures, stats.failures());
    }
}

fn catch_up(counter: &IntCounter, total: u64) {
    let delta = total.saturating_sub(counter.get());
    if delta > 0 {
        counter.inc_by(delta);
    }
}
