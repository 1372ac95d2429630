//! ## blocklease-core::alloc::leaser
//! **Pool → block → address allocator**
//!
//! [`BlockAllocator`] owns up to two [`AddressPool`]s and every [`Block`] ever
//! derived from them. All state sits behind one allocator-wide lock: mutations
//! take it exclusively, introspection and snapshots take it shared.

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;

use ipnetwork::IpNetwork;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::block::Block;
use super::id::BlockId;
use super::pool::AddressPool;
use super::stats::{AllocatorUsage, FamilyUsage};
use crate::error::LeaseError;
use crate::family::Family;

/// One family's pool configuration as handed to [`BlockAllocator::new`].
#[derive(Debug, Clone, Copy)]
pub struct PoolSpec<'a> {
    pub cidr: &'a str,
    pub block_prefix: u8,
}

impl<'a> PoolSpec<'a> {
    pub fn new(cidr: &'a str, block_prefix: u8) -> Self {
        Self { cidr, block_prefix }
    }

    pub fn disabled() -> Self {
        Self {
            cidr: "",
            block_prefix: 0,
        }
    }
}

/// A block handed out by [`BlockAllocator::get_block`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockLease {
    pub id: BlockId,
    pub cidr: IpNetwork,
}

/// A single address handed out by [`BlockAllocator::get_address`].
///
/// Displays as `address/prefix`, where the prefix is the block's, not the host's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressLease {
    pub addr: IpAddr,
    pub prefix: u8,
}

impl fmt::Display for AddressLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

/// Lock-protected allocator state.
#[derive(Debug, Default, Clone)]
pub(crate) struct LeaserState {
    pub(crate) v4: Option<AddressPool>,
    pub(crate) v6: Option<AddressPool>,
    pub(crate) allocated: BTreeMap<BlockId, Block>,
    pub(crate) free: BTreeMap<BlockId, Block>,
}

impl LeaserState {
    pub(crate) fn pool(&self, family: Family) -> Option<&AddressPool> {
        match family {
            Family::V4 => self.v4.as_ref(),
            Family::V6 => self.v6.as_ref(),
        }
    }

    fn pool_mut(&mut self, family: Family) -> Option<&mut AddressPool> {
        match family {
            Family::V4 => self.v4.as_mut(),
            Family::V6 => self.v6.as_mut(),
        }
    }

    fn take_free(&mut self, family: Family) -> Option<Block> {
        let id = self
            .free
            .values()
            .find(|block| block.family() == family)
            .map(|block| block.id().clone())?;
        self.free.remove(&id)
    }

    fn derive_block(&mut self, family: Family) -> Result<Block, LeaseError> {
        let pool = self
            .pool_mut(family)
            .ok_or(LeaseError::FamilyDisabled(family))?;
        let cidr = pool.derive_next().ok_or_else(|| LeaseError::PoolExhausted {
            family,
            pool: pool.cidr(),
        })?;
        Ok(Block::new(self.fresh_id(), cidr))
    }

    /// A random id not held by any allocated or free block.
    fn fresh_id(&self) -> BlockId {
        let mut rng = rand::rng();
        loop {
            let id = BlockId::generate(&mut rng);
            if !self.allocated.contains_key(&id) && !self.free.contains_key(&id) {
                return id;
            }
            warn!(%id, "Generated block id collides with an existing block, retrying");
        }
    }
}

/// Thread-safe allocator of blocks and of addresses inside leased blocks.
#[derive(Debug)]
pub struct BlockAllocator {
    state: RwLock<LeaserState>,
}

impl BlockAllocator {
    /// Builds an allocator from the IPv4 and IPv6 pool configuration.
    ///
    /// A family whose pool is empty or invalid is disabled; construction fails
    /// only when both families end up disabled.
    pub fn new(v4: PoolSpec<'_>, v6: PoolSpec<'_>) -> Result<Self, LeaseError> {
        let mut reasons = Vec::new();
        let mut setup = |family: Family, spec: PoolSpec<'_>| {
            match AddressPool::parse(family, spec.cidr, spec.block_prefix) {
                Ok(Some(pool)) => Some(pool),
                Ok(None) => {
                    debug!("{family} pool not configured");
                    reasons.push(format!("{family} pool is empty"));
                    None
                }
                Err(e) => {
                    warn!("{e}; {family} leasing disabled");
                    reasons.push(e.to_string());
                    None
                }
            }
        };

        let v4 = setup(Family::V4, v4);
        let v6 = setup(Family::V6, v6);
        if v4.is_none() && v6.is_none() {
            return Err(LeaseError::ConfigInvalid(format!(
                "no usable address pool ({})",
                reasons.join("; ")
            )));
        }

        Ok(Self::from_state(LeaserState {
            v4,
            v6,
            ..LeaserState::default()
        }))
    }

    pub(crate) fn from_state(state: LeaserState) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }

    /// Runs `f` against a consistent view of the whole allocator.
    pub(crate) fn read<R>(&self, f: impl FnOnce(&LeaserState) -> R) -> R {
        f(&self.state.read())
    }

    /// Leases a block of the requested IP version (4 or 6).
    ///
    /// A previously returned block of that family is always preferred over
    /// deriving a new one from the pool.
    pub fn get_block(&self, version: u8) -> Result<BlockLease, LeaseError> {
        let family = Family::try_from(version)?;
        let mut state = self.state.write();

        let block = match state.take_free(family) {
            Some(block) => {
                debug!(id = %block.id(), "Reusing free block");
                block
            }
            None => state.derive_block(family)?,
        };

        let lease = BlockLease {
            id: block.id().clone(),
            cidr: block.cidr(),
        };
        state.allocated.insert(lease.id.clone(), block);
        info!(id = %lease.id, cidr = %lease.cidr, "Block leased");
        Ok(lease)
    }

    /// Returns a leased block to the free list.
    ///
    /// Addresses still leased inside the block are discarded; callers are
    /// expected to have released them first.
    pub fn return_block(&self, id: &str) -> Result<(), LeaseError> {
        let mut state = self.state.write();
        let mut block = state
            .allocated
            .remove(id)
            .ok_or_else(|| LeaseError::BlockNotFound(BlockId::from(id)))?;

        if block.allocated_count() > 0 {
            warn!(
                id,
                leased = block.allocated_count(),
                "Block returned with addresses still leased"
            );
        }
        block.reset();
        info!(id, cidr = %block.cidr(), "Block returned");
        state.free.insert(block.id().clone(), block);
        Ok(())
    }

    /// Leases one address from an allocated block.
    pub fn get_address(&self, id: &str) -> Result<AddressLease, LeaseError> {
        let mut state = self.state.write();
        let block = state
            .allocated
            .get_mut(id)
            .ok_or_else(|| LeaseError::BlockNotFound(BlockId::from(id)))?;

        let addr = block.get_address()?;
        let lease = AddressLease {
            addr,
            prefix: block.prefix(),
        };
        info!(id, address = %lease, "Address leased");
        Ok(lease)
    }

    /// Returns an address to the allocated block it was leased from.
    pub fn return_address(&self, id: &str, address: &str) -> Result<(), LeaseError> {
        let mut state = self.state.write();
        let block = state
            .allocated
            .get_mut(id)
            .ok_or_else(|| LeaseError::BlockNotFound(BlockId::from(id)))?;

        let addr = block.return_address(address)?;
        info!(id, address = %addr, "Address returned");
        Ok(())
    }

    /// Configured pool of `family`, if any.
    pub fn pool(&self, family: Family) -> Option<AddressPool> {
        self.state.read().pool(family).cloned()
    }

    /// Point-in-time usage figures per configured family.
    pub fn usage(&self) -> AllocatorUsage {
        let state = self.state.read();
        let families = [Family::V4, Family::V6]
            .into_iter()
            .filter_map(|family| {
                let pool = state.pool(family)?;
                let of_family = |blocks: &BTreeMap<BlockId, Block>| {
                    blocks.values().filter(|b| b.family() == family).count()
                };
                Some(FamilyUsage {
                    family,
                    pool: pool.cidr(),
                    block_prefix: pool.block_prefix(),
                    block_count: pool.block_count(),
                    derived_blocks: pool.next_block(),
                    allocated_blocks: of_family(&state.allocated),
                    free_blocks: of_family(&state.free),
                    allocated_addresses: state
                        .allocated
                        .values()
                        .filter(|b| b.family() == family)
                        .map(Block::allocated_count)
                        .sum(),
                })
            })
            .collect();
        AllocatorUsage { families }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use tracing_test::traced_test;

    fn allocator() -> BlockAllocator {
        BlockAllocator::new(
            PoolSpec::new("192.168.0.1/16", 24),
            PoolSpec::new("fe80::/48", 64),
        )
        .unwrap()
    }

    #[test]
    fn construction_needs_one_usable_family() {
        let cases = [
            ("bla", 0, "bla", 0, false),
            ("", 0, "", 0, false),
            ("", 24, "", 64, false),
            ("192.168.0.1/16", 0, "fe80::/48", 0, false),
            ("", 0, "fe80::/48", 128, false),
            ("", 0, "fe80::/64", 56, false),
            ("192.168.0.1/16", 32, "", 0, false),
            ("192.168.0.1/16", 8, "", 0, false),
            ("", 0, "fe80::/48", 64, true),
            ("192.168.0.1/16", 24, "", 0, true),
            ("192.168.0.1/16", 24, "fe80::/48", 64, true),
        ];

        for (v4, v4_block, v6, v6_block, ok) in cases {
            let result =
                BlockAllocator::new(PoolSpec::new(v4, v4_block), PoolSpec::new(v6, v6_block));
            assert_eq!(result.is_ok(), ok, "v4={v4}/{v4_block} v6={v6}/{v6_block}");
            if !ok {
                assert!(matches!(result, Err(LeaseError::ConfigInvalid(_))));
            }
        }
    }

    #[test]
    fn leases_blocks_and_addresses() {
        let lsr = allocator();

        let b4 = lsr.get_block(4).unwrap();
        assert_eq!(b4.cidr.to_string(), "192.168.0.0/24");
        let b6 = lsr.get_block(6).unwrap();
        assert_eq!(b6.cidr.to_string(), "fe80::/64");
        assert_ne!(b4.id, b6.id);

        assert_eq!(
            lsr.get_address(b4.id.as_str()).unwrap().to_string(),
            "192.168.0.1/24"
        );
        assert_eq!(
            lsr.get_address(b6.id.as_str()).unwrap().to_string(),
            "fe80::1/64"
        );
    }

    #[test]
    fn rejects_unknown_family() {
        let lsr = allocator();
        assert_eq!(lsr.get_block(0), Err(LeaseError::InvalidFamily(0)));
        assert_eq!(lsr.get_block(5), Err(LeaseError::InvalidFamily(5)));
    }

    #[test]
    fn disabled_family_is_reported() {
        let lsr =
            BlockAllocator::new(PoolSpec::new("192.168.0.0/16", 24), PoolSpec::disabled()).unwrap();
        assert_eq!(lsr.get_block(6), Err(LeaseError::FamilyDisabled(Family::V6)));
        assert!(lsr.get_block(4).is_ok());

        let lsr = BlockAllocator::new(PoolSpec::disabled(), PoolSpec::new("fe80::/48", 64)).unwrap();
        assert_eq!(lsr.get_block(4), Err(LeaseError::FamilyDisabled(Family::V4)));
    }

    #[test]
    fn returned_block_is_reused_with_reset_addresses() {
        let lsr = allocator();
        let first = lsr.get_block(4).unwrap();
        lsr.get_address(first.id.as_str()).unwrap();
        lsr.get_address(first.id.as_str()).unwrap();

        lsr.return_block(first.id.as_str()).unwrap();
        let again = lsr.get_block(4).unwrap();
        assert_eq!(again, first);
        assert_eq!(
            lsr.get_address(again.id.as_str()).unwrap().to_string(),
            "192.168.0.1/24"
        );

        // Reuse never advances the pool.
        assert_eq!(lsr.pool(Family::V4).unwrap().next_block(), 1);
    }

    #[test]
    fn reuse_is_filtered_by_family() {
        let lsr = allocator();
        let b6 = lsr.get_block(6).unwrap();
        lsr.return_block(b6.id.as_str()).unwrap();

        let b4 = lsr.get_block(4).unwrap();
        assert_ne!(b4.id, b6.id);
        assert_eq!(lsr.get_block(6).unwrap().id, b6.id);
    }

    #[test]
    fn unknown_and_free_blocks_are_not_addressable() {
        let lsr = allocator();
        assert!(matches!(
            lsr.return_block("aaa"),
            Err(LeaseError::BlockNotFound(_))
        ));
        assert!(matches!(
            lsr.get_address("aaa"),
            Err(LeaseError::BlockNotFound(_))
        ));
        assert!(matches!(
            lsr.return_address("aaa", "fe80::900/64"),
            Err(LeaseError::BlockNotFound(_))
        ));

        let b = lsr.get_block(4).unwrap();
        lsr.return_block(b.id.as_str()).unwrap();
        assert!(matches!(
            lsr.get_address(b.id.as_str()),
            Err(LeaseError::BlockNotFound(_))
        ));
        assert!(matches!(
            lsr.return_block(b.id.as_str()),
            Err(LeaseError::BlockNotFound(_))
        ));
    }

    #[test]
    fn double_address_return_fails() {
        let lsr = allocator();
        let b = lsr.get_block(4).unwrap();
        let addr = lsr.get_address(b.id.as_str()).unwrap();

        lsr.return_address(b.id.as_str(), &addr.to_string()).unwrap();
        assert!(matches!(
            lsr.return_address(b.id.as_str(), "192.168.0.1"),
            Err(LeaseError::AddressNotFound { .. })
        ));
        assert!(matches!(
            lsr.return_address(b.id.as_str(), "123.12.23.13"),
            Err(LeaseError::AddressNotFound { .. })
        ));
    }

    #[test]
    fn pool_exhaustion_is_terminal() {
        let lsr = BlockAllocator::new(PoolSpec::new("10.0.0.0/30", 31), PoolSpec::disabled())
            .unwrap();
        lsr.get_block(4).unwrap();
        lsr.get_block(4).unwrap();
        assert!(matches!(
            lsr.get_block(4),
            Err(LeaseError::PoolExhausted { family: Family::V4, .. })
        ));
    }

    #[test]
    fn usage_counts_per_family() {
        let lsr = allocator();
        let a = lsr.get_block(4).unwrap();
        let b = lsr.get_block(4).unwrap();
        lsr.get_block(6).unwrap();
        lsr.get_address(a.id.as_str()).unwrap();
        lsr.get_address(a.id.as_str()).unwrap();
        lsr.return_block(b.id.as_str()).unwrap();

        let usage = lsr.usage();
        let v4 = usage.family(Family::V4).unwrap();
        assert_eq!(v4.pool, "192.168.0.0/16");
        assert_eq!(v4.block_count, 256);
        assert_eq!(v4.derived_blocks, 2);
        assert_eq!(v4.allocated_blocks, 1);
        assert_eq!(v4.free_blocks, 1);
        assert_eq!(v4.allocated_addresses, 2);

        let v6 = usage.family(Family::V6).unwrap();
        assert_eq!(v6.allocated_blocks, 1);
        assert_eq!(v6.allocated_addresses, 0);
    }

    #[traced_test]
    #[test]
    fn logs_lease_events() {
        let lsr = allocator();
        let b = lsr.get_block(4).unwrap();
        lsr.return_block(b.id.as_str()).unwrap();
        assert!(logs_contain("Block leased"));
        assert!(logs_contain("Block returned"));
    }

    #[test]
    fn concurrent_leasing_hands_out_distinct_blocks() {
        let lsr = Arc::new(allocator());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lsr = Arc::clone(&lsr);
                std::thread::spawn(move || {
                    (0..16)
                        .map(|_| lsr.get_block(4).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let leases: Vec<BlockLease> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let ids: HashSet<_> = leases.iter().map(|l| l.id.clone()).collect();
        let cidrs: HashSet<_> = leases.iter().map(|l| l.cidr).collect();
        assert_eq!(ids.len(), 128);
        assert_eq!(cidrs.len(), 128);
        assert_eq!(lsr.pool(Family::V4).unwrap().next_block(), 128);
    }

    proptest! {
        #[test]
        fn allocated_blocks_never_share_ids(ops in proptest::collection::vec(any::<bool>(), 1..64)) {
            let lsr = allocator();
            let mut held: Vec<BlockId> = Vec::new();
            for lease in ops {
                if lease || held.is_empty() {
                    held.push(lsr.get_block(4).unwrap().id);
                } else {
                    let id = held.remove(0);
                    lsr.return_block(id.as_str()).unwrap();
                }
                let unique: HashSet<_> = held.iter().collect();
                prop_assert_eq!(unique.len(), held.len());
            }
        }

        #[test]
        fn network_address_is_never_issued(count in 1usize..200) {
            let lsr = allocator();
            let b = lsr.get_block(4).unwrap();
            for _ in 0..count {
                let addr = lsr.get_address(b.id.as_str()).unwrap();
                prop_assert_ne!(addr.addr, b.cidr.network());
            }
        }
    }
}
