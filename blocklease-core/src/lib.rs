//! # blocklease-core
//!
//! IP address management engine for container networks.
//!
//! One or two configured pools (IPv4 and/or IPv6) are cut into fixed-size
//! blocks, and every leased block is cut into individual addresses. Both
//! levels hand out returned entries before deriving new ones.
//!
//! ### Key Submodules:
//! - `alloc`: Pools, blocks and the thread-safe [`BlockAllocator`]
//! - `snapshot`: YAML snapshots that carry allocator state across restarts
//!
//! ```
//! use blocklease_core::prelude::*;
//!
//! let lsr = BlockAllocator::new(
//!     PoolSpec::new("192.168.0.0/16", 24),
//!     PoolSpec::new("fe80::/48", 64),
//! )?;
//! let block = lsr.get_block(4)?;
//! assert_eq!(block.cidr.to_string(), "192.168.0.0/24");
//! assert_eq!(lsr.get_address(block.id.as_str())?.to_string(), "192.168.0.1/24");
//! # Ok::<(), LeaseError>(())
//! ```

pub mod alloc;
pub mod error;
pub mod family;
pub mod snapshot;

pub mod prelude {
    pub use crate::alloc::*;
    pub use crate::error::*;
    pub use crate::family::Family;
    pub use crate::snapshot::*;
}

pub use alloc::{AddressLease, BlockAllocator, BlockId, BlockLease, PoolSpec};
pub use error::{LeaseError, PoolError, SnapshotError};
pub use family::Family;
pub use snapshot::{SaveOutcome, SnapshotStore};
