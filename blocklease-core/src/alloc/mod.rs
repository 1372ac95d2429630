//! ## blocklease-core::alloc
//! **Hierarchical pool → block → address allocation**
//!
//! ### Key Submodules:
//! - `pool/`: Configured network ranges cut into fixed-size blocks
//! - `block/`: Leased blocks and the addresses inside them
//! - `leaser/`: The thread-safe allocator owning pools and blocks
//! - `stats/`: Usage figures for introspection and metrics

pub mod block;
pub mod id;
pub mod leaser;
pub mod pool;
pub mod stats;

pub use block::Block;
pub use id::BlockId;
pub use leaser::{AddressLease, BlockAllocator, BlockLease, PoolSpec};
pub use pool::AddressPool;
pub use stats::{AllocatorUsage, FamilyUsage};
