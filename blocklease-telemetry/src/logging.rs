//! ## blocklease-telemetry::logging
//! **Structured logging with `tracing`**
//!
//! `RUST_LOG` wins over the configured level when it is set.

use blocklease_core::alloc::AllocatorUsage;
use blocklease_core::Family;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

pub type InitError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Clone)]
pub struct LeaseLogger;

impl LeaseLogger {
    /// Installs the global subscriber. Fails if one is already set.
    pub fn init(default_level: &str) -> Result<(), InitError> {
        fmt()
            .with_env_filter(Self::filter(default_level))
            .with_thread_names(true)
            .with_target(false)
            .try_init()
    }

    fn filter(default_level: &str) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    }

    /// Logs one line per configured pool and a warning per disabled family.
    pub fn pool_summary(usage: &AllocatorUsage) {
        for family in [Family::V4, Family::V6] {
            match usage.family(family) {
                Some(u) => info!("{u}"),
                None => warn!("{family} address pool disabled"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blocklease_core::alloc::FamilyUsage;
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn summary_covers_both_families() {
        let usage = AllocatorUsage {
            families: vec![FamilyUsage {
                family: Family::V4,
                pool: "192.168.0.0/16".into(),
                block_prefix: 24,
                block_count: 256,
                derived_blocks: 3,
                allocated_blocks: 2,
                free_blocks: 1,
                allocated_addresses: 7,
            }],
        };
        LeaseLogger::pool_summary(&usage);
        assert!(logs_contain("IPv4 address pool: 192.168.0.0/16 / Len (24): 256 blocks"));
        assert!(logs_contain("IPv6 address pool disabled"));
    }

    #[test]
    fn falls_back_to_configured_level() {
        if std::env::var_os("RUST_LOG").is_none() {
            assert_eq!(LeaseLogger::filter("debug").to_string(), "debug");
        }
    }
}
