//! ## blocklease-core::alloc::stats
//! **Allocator usage figures**
//!
//! Read-only snapshot of how much of each pool is in use, taken under the
//! allocator's shared lock.

use std::fmt;

use crate::family::Family;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FamilyUsage {
    pub family: Family,
    /// Pool range in CIDR notation.
    pub pool: String,
    pub block_prefix: u8,
    /// Blocks the pool can ever yield.
    pub block_count: u128,
    /// Blocks derived so far (the pool's next block index).
    pub derived_blocks: u64,
    pub allocated_blocks: usize,
    pub free_blocks: usize,
    /// Addresses leased across all allocated blocks of this family.
    pub allocated_addresses: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllocatorUsage {
    pub families: Vec<FamilyUsage>,
}

impl AllocatorUsage {
    pub fn family(&self, family: Family) -> Option<&FamilyUsage> {
        self.families.iter().find(|u| u.family == family)
    }
}

impl fmt::Display for FamilyUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} address pool: {} / Len ({}): {} blocks, {} derived, {} allocated, {} free, {} addresses leased",
            self.family,
            self.pool,
            self.block_prefix,
            self.block_count,
            self.derived_blocks,
            self.allocated_blocks,
            self.free_blocks,
            self.allocated_addresses
        )
    }
}
