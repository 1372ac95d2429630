//! Lease configuration.
//!
//! Describes the address pools handed to the allocator and where its state
//! is persisted between restarts.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation;

/// Address pools and snapshot persistence.
#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq, Eq)]
#[validate(schema(function = validation::validate_lease_sources))]
pub struct LeaseConfig {
    /// Snapshot file used to save state and restore it after restart.
    #[validate(custom(function = validation::validate_file_name))]
    #[serde(default = "default_file")]
    pub file: String,

    /// Delete the snapshot file before starting.
    #[serde(default)]
    pub wipe: bool,

    /// Main IPv4 pool, e.g. `192.168.0.0/16`. Empty disables IPv4.
    #[serde(default)]
    pub v4: String,

    /// Prefix length of leased IPv4 blocks.
    #[validate(range(max = 32))]
    #[serde(default = "default_v4_block")]
    pub v4_block: u8,

    /// Main IPv6 pool, e.g. `fe80::/56`. Empty disables IPv6.
    #[serde(default)]
    pub v6: String,

    /// Prefix length of leased IPv6 blocks.
    #[validate(range(max = 128))]
    #[serde(default = "default_v6_block")]
    pub v6_block: u8,

    /// Seconds between background snapshot saves.
    #[validate(range(min = 1, max = 86400))]
    #[serde(default = "default_save_interval")]
    pub save_interval_secs: u64,
}

fn default_file() -> String {
    "lease.yaml".into()
}

fn default_v4_block() -> u8 {
    24
}

fn default_v6_block() -> u8 {
    64
}

fn default_save_interval() -> u64 {
    30
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            file: default_file(),
            wipe: false,
            v4: String::new(),
            v4_block: default_v4_block(),
            v6: String::new(),
            v6_block: default_v6_block(),
            save_interval_secs: default_save_interval(),
        }
    }
}

impl LeaseConfig {
    pub fn file_path(&self) -> PathBuf {
        PathBuf::from(&self.file)
    }

    pub fn save_interval(&self) -> Duration {
        Duration::from_secs(self.save_interval_secs)
    }

    /// Whether at least one pool is configured.
    pub fn has_pools(&self) -> bool {
        !self.v4.trim().is_empty() || !self.v6.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_lease_config_is_valid() {
        LeaseConfig::default()
            .validate()
            .expect("Default config should be valid");
    }

    #[test]
    fn block_prefix_is_bounded() {
        let config = LeaseConfig {
            v4_block: 33,
            ..LeaseConfig::default()
        };
        assert!(config.validate().is_err());

        let config = LeaseConfig {
            v6_block: 129,
            ..LeaseConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_pool_is_left_to_the_allocator() {
        let config = LeaseConfig {
            v4: "bla".into(),
            ..LeaseConfig::default()
        };
        config.validate().expect("CIDR syntax is not checked here");
    }

    #[test]
    fn wipe_without_pools_is_rejected() {
        let config = LeaseConfig {
            wipe: true,
            ..LeaseConfig::default()
        };
        assert!(config.validate().is_err());

        let config = LeaseConfig {
            wipe: true,
            v6: "fe80::/48".into(),
            ..LeaseConfig::default()
        };
        config.validate().expect("A pool makes wiping safe");
    }

    #[test]
    fn empty_file_name_is_rejected() {
        let config = LeaseConfig {
            file: " ".into(),
            v4: "10.0.0.0/8".into(),
            ..LeaseConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn interval_converts_to_duration() {
        assert_eq!(LeaseConfig::default().save_interval(), Duration::from_secs(30));
    }
}
