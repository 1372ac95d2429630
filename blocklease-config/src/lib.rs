//! # Blocklease Configuration System
//!
//! Layered configuration for the block lease service.
//!
//! ## Layers
//! 1. Built-in defaults
//! 2. `config/blocklease.yaml`, or an explicit file given by the caller
//! 3. `BLOCKLEASE_*` environment variables, nested with `__`
//!    (`BLOCKLEASE_LEASE__V4=10.0.0.0/8`)
//! 4. Command line overrides

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod error;
mod lease;
mod telemetry;
mod validation;

pub use error::ConfigError;
pub use lease::LeaseConfig;
pub use telemetry::TelemetryConfig;

/// Default location of the configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/blocklease.yaml";

/// Prefix of environment variables read by [`BlockleaseConfig::load`].
pub const ENV_PREFIX: &str = "BLOCKLEASE_";

/// Top-level configuration container.
#[derive(Debug, Serialize, Deserialize, Validate, Default, Clone, PartialEq, Eq)]
pub struct BlockleaseConfig {
    /// Address pools and snapshot persistence.
    #[validate(nested)]
    #[serde(default)]
    pub lease: LeaseConfig,

    /// Logging configuration.
    #[validate(nested)]
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Values supplied on the command line. Unset fields leave lower layers untouched.
#[derive(Debug, Serialize, Default, Clone)]
pub struct ConfigOverrides {
    pub lease: LeaseOverrides,
    pub telemetry: TelemetryOverrides,
}

#[derive(Debug, Serialize, Default, Clone)]
pub struct LeaseOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wipe: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub v4: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub v4_block: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub v6: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub v6_block: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_interval_secs: Option<u64>,
}

#[derive(Debug, Serialize, Default, Clone)]
pub struct TelemetryOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl BlockleaseConfig {
    /// Load configuration from the default file and environment.
    ///
    /// A missing `config/blocklease.yaml` is not an error; defaults are used.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(None, &ConfigOverrides::default())
    }

    /// Load configuration from a specific file plus environment.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::load_with(Some(path.as_ref()), &ConfigOverrides::default())
    }

    /// Load every layer, with `overrides` taking precedence over all others.
    ///
    /// An explicit `path` must exist.
    pub fn load_with(
        path: Option<&Path>,
        overrides: &ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(BlockleaseConfig::default()));

        match path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::FileNotFound(PathBuf::from(path)));
                }
                figment = figment.merge(Yaml::file(path));
            }
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                figment = figment.merge(Yaml::file(DEFAULT_CONFIG_PATH));
            }
            None => {}
        }

        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .merge(Serialized::defaults(overrides))
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                Ok(config)
            })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use figment::Jail;

    use super::*;

    fn load(path: Option<&Path>, overrides: &ConfigOverrides) -> figment::error::Result<BlockleaseConfig> {
        BlockleaseConfig::load_with(path, overrides).map_err(|e| e.to_string().into())
    }

    #[test]
    fn full_config_validation() {
        let config = BlockleaseConfig::default();
        config.validate().expect("Default config should validate");
    }

    #[test]
    fn defaults_without_file() {
        Jail::expect_with(|_| {
            let config = load(None, &ConfigOverrides::default())?;
            assert_eq!(config, BlockleaseConfig::default());
            assert_eq!(config.lease.file, "lease.yaml");
            assert_eq!(config.lease.v4_block, 24);
            assert_eq!(config.lease.v6_block, 64);
            assert_eq!(config.lease.save_interval(), Duration::from_secs(30));
            assert_eq!(config.telemetry.log_level, "info");
            Ok(())
        });
    }

    #[test]
    fn default_file_is_merged() {
        Jail::expect_with(|jail| {
            jail.create_dir("config")?;
            jail.create_file(
                DEFAULT_CONFIG_PATH,
                r#"
lease:
  v4: 10.10.0.0/16
  v4_block: 26
telemetry:
  log_level: debug
"#,
            )?;
            let config = load(None, &ConfigOverrides::default())?;
            assert_eq!(config.lease.v4, "10.10.0.0/16");
            assert_eq!(config.lease.v4_block, 26);
            assert_eq!(config.lease.v6_block, 64);
            assert_eq!(config.telemetry.log_level, "debug");
            Ok(())
        });
    }

    #[test]
    fn environment_override() {
        Jail::expect_with(|jail| {
            jail.create_file("pools.yaml", "lease:\n  v6: fd00::/48\n")?;
            jail.set_env("BLOCKLEASE_LEASE__V6", "fe80::/56");
            jail.set_env("BLOCKLEASE_LEASE__SAVE_INTERVAL_SECS", "5");
            let config = load(Some(Path::new("pools.yaml")), &ConfigOverrides::default())?;
            assert_eq!(config.lease.v6, "fe80::/56");
            assert_eq!(config.lease.save_interval_secs, 5);
            Ok(())
        });
    }

    #[test]
    fn overrides_win_over_environment() {
        Jail::expect_with(|jail| {
            jail.set_env("BLOCKLEASE_LEASE__V4", "10.0.0.0/8");
            jail.set_env("BLOCKLEASE_LEASE__FILE", "env.yaml");
            let overrides = ConfigOverrides {
                lease: LeaseOverrides {
                    v4: Some("192.168.0.0/16".into()),
                    wipe: Some(true),
                    ..LeaseOverrides::default()
                },
                ..ConfigOverrides::default()
            };
            let config = load(None, &overrides)?;
            assert_eq!(config.lease.v4, "192.168.0.0/16");
            assert_eq!(config.lease.file, "env.yaml");
            assert!(config.lease.wipe);
            Ok(())
        });
    }

    #[test]
    fn explicit_file_must_exist() {
        Jail::expect_with(|_| {
            let err = BlockleaseConfig::load_from_path("missing.yaml").unwrap_err();
            assert!(matches!(err, ConfigError::FileNotFound(_)));
            Ok(())
        });
    }

    #[test]
    fn invalid_values_are_reported() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "bad.yaml",
                "lease:\n  v4_block: 40\n  wipe: true\ntelemetry:\n  log_level: loud\n",
            )?;
            let err = BlockleaseConfig::load_from_path("bad.yaml").unwrap_err();
            let ConfigError::Validation(errors) = &err else {
                panic!("expected validation error, got {err}");
            };
            assert!(errors.errors().contains_key("lease"));
            assert!(errors.errors().contains_key("telemetry"));
            let text = err.to_string();
            assert!(text.contains("lease.v4_block"), "{text}");
            assert!(text.contains("telemetry.log_level"), "{text}");
            Ok(())
        });
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        Jail::expect_with(|jail| {
            jail.create_file("broken.yaml", "lease:\n  v4_block: many\n")?;
            let err = BlockleaseConfig::load_from_path("broken.yaml").unwrap_err();
            assert!(matches!(err, ConfigError::Parsing(_)));
            Ok(())
        });
    }
}
