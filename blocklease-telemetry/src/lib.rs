//! # Blocklease Telemetry
//!
//! Logging setup and Prometheus metrics for the lease service.

pub mod logging;
pub mod metrics;

pub use logging::LeaseLogger;
pub use metrics::MetricsRecorder;
