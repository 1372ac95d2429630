// blocklease-config/src/validation.rs
//! Custom validation functions for configuration.

use validator::ValidationError;

use crate::lease::LeaseConfig;

/// The snapshot path must name a file.
pub fn validate_file_name(file: &str) -> Result<(), ValidationError> {
    if file.trim().is_empty() {
        Err(ValidationError::new("empty_file_name"))
    } else {
        Ok(())
    }
}

/// Wiping the snapshot with no pool configured leaves nothing to build from.
pub fn validate_lease_sources(lease: &LeaseConfig) -> Result<(), ValidationError> {
    if lease.wipe && !lease.has_pools() {
        let mut err = ValidationError::new("no_lease_source");
        err.message = Some("no pool configured and the lease file is wiped".into());
        return Err(err);
    }
    Ok(())
}

/// Validate log level name.
pub fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid = ["trace", "debug", "info", "warn", "error"]
        .contains(&level.to_lowercase().as_str());
    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_log_level"))
    }
}
