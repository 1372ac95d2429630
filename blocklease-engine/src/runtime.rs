/*!
# Runtime Entry Points

Lifecycles shared by every frontend: the long-running lease service and
one-shot offline operations against the persisted state.
*/

use std::future::Future;

use tracing::{debug, info, instrument};

use blocklease_api::LeaseDriver;
use blocklease_config::BlockleaseConfig;
use blocklease_core::alloc::AllocatorUsage;
use blocklease_core::{LeaseError, SaveOutcome};
use blocklease_telemetry::MetricsRecorder;

use crate::engine::{EngineError, IpamRuntime, StartupOrigin};

/// Runs the lease service until `shutdown` resolves, then writes the final snapshot.
#[instrument(level = "info", name = "run_service_mode", skip_all)]
pub async fn run_service_mode<F>(
    config: BlockleaseConfig,
    metrics: MetricsRecorder,
    shutdown: F,
) -> Result<SaveOutcome, EngineError>
where
    F: Future<Output = ()>,
{
    let runtime = IpamRuntime::bootstrap(config, metrics)?;
    runtime.log_summary();

    let saver = runtime.start_saver();
    info!(origin = ?runtime.origin(), "Lease service running");

    shutdown.await;
    info!("Shutdown requested");
    runtime.shutdown(saver).await
}

/// Usage of the persisted state, or of a fresh allocator if none is usable.
/// Nothing is written.
pub fn collect_status(
    config: BlockleaseConfig,
    metrics: MetricsRecorder,
) -> Result<(AllocatorUsage, StartupOrigin), EngineError> {
    let runtime = IpamRuntime::bootstrap(offline(config), metrics)?;
    Ok((runtime.usage(), runtime.origin()))
}

/// Restores the allocator, applies `op` through a driver and saves the result.
///
/// The state is saved only when `op` succeeds.
#[instrument(level = "debug", skip_all)]
pub fn run_offline<T, F>(
    config: BlockleaseConfig,
    metrics: MetricsRecorder,
    op: F,
) -> Result<T, EngineError>
where
    F: FnOnce(&LeaseDriver) -> Result<T, LeaseError>,
{
    let runtime = IpamRuntime::bootstrap(offline(config), metrics)?;
    let value = op(&runtime.driver())?;
    let outcome = runtime.save()?;
    debug!(?outcome, "Offline operation persisted");
    Ok(value)
}

fn offline(mut config: BlockleaseConfig) -> BlockleaseConfig {
    if config.lease.wipe {
        debug!("Ignoring wipe for a one-shot command");
        config.lease.wipe = false;
    }
    config
}
