use std::path::PathBuf;

use thiserror::Error;

use crate::alloc::BlockId;
use crate::family::Family;

/// Errors returned by the block allocator.
///
/// Every variant is terminal for the call that produced it: nothing inside
/// the allocator retries.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LeaseError {
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("Wrong requested IP protocol version: {0}")]
    InvalidFamily(u8),

    #[error("No {0} pool is configured")]
    FamilyDisabled(Family),

    #[error("Can't get new {family} block from main pool {pool}")]
    PoolExhausted { family: Family, pool: String },

    #[error("{0} address block not found")]
    BlockNotFound(BlockId),

    #[error("Address {address} is not leased from block {block}")]
    AddressNotFound { block: BlockId, address: String },

    #[error("No more addresses in block {block} ({cidr})")]
    AddressPoolExhausted { block: BlockId, cidr: String },
}

/// Reasons a single family's pool is rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Can't parse main {family} address pool '{cidr}'")]
    InvalidCidr { family: Family, cidr: String },

    #[error("{family} block prefix /{block} must be longer than /{pool} and shorter than /{width}")]
    BlockPrefixOutOfRange {
        family: Family,
        pool: u8,
        block: u8,
        width: u8,
    },
}

/// Snapshot persistence errors.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Snapshot I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed snapshot: {0}")]
    Malformed(#[source] serde_yaml::Error),

    #[error("Inconsistent snapshot: {0}")]
    Inconsistent(String),

    #[error("Snapshot encoding failed: {0}")]
    Encode(#[source] serde_yaml::Error),
}

impl SnapshotError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SnapshotError::Io {
            path: path.into(),
            source,
        }
    }

    /// True when the file was readable but its content can't be trusted.
    pub fn is_corrupt(&self) -> bool {
        matches!(
            self,
            SnapshotError::Malformed(_) | SnapshotError::Inconsistent(_)
        )
    }
}
