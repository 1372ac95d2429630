//! Persisted form of the allocator state.
//!
//! The record mirrors [`BlockAllocator`] one to one: per configured family the
//! pool range, block prefix and next block index, then every allocated and
//! free block with its own address lists. Loading re-validates everything, so
//! a record that would not reproduce a working allocator is rejected whole.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::net::IpAddr;

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

use crate::alloc::block::{Block, FIRST_ADDRESS_INDEX};
use crate::alloc::leaser::LeaserState;
use crate::alloc::{AddressPool, BlockAllocator, BlockId};
use crate::error::SnapshotError;
use crate::family::Family;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    #[serde(default)]
    pub v4: Option<PoolRecord>,
    #[serde(default)]
    pub v6: Option<PoolRecord>,
    #[serde(default)]
    pub allocated: Vec<BlockRecord>,
    #[serde(default)]
    pub free: Vec<BlockRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolRecord {
    pub pool: String,
    pub block_prefix: u8,
    #[serde(default)]
    pub next_block: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub id: BlockId,
    pub family: Family,
    pub cidr: String,
    pub next_address: u64,
    #[serde(default)]
    pub allocated: Vec<IpAddr>,
    #[serde(default)]
    pub free: Vec<IpAddr>,
}

impl SnapshotRecord {
    /// Captures the allocator under its shared lock.
    pub fn capture(allocator: &BlockAllocator) -> Self {
        allocator.read(|state| Self {
            v4: state.v4.as_ref().map(PoolRecord::from),
            v6: state.v6.as_ref().map(PoolRecord::from),
            allocated: state.allocated.values().map(BlockRecord::from).collect(),
            free: state.free.values().map(BlockRecord::from).collect(),
        })
    }

    /// Rebuilds an allocator, failing on anything that does not validate.
    pub fn into_allocator(self) -> Result<BlockAllocator, SnapshotError> {
        let v4 = restore_pool(Family::V4, self.v4)?;
        let v6 = restore_pool(Family::V6, self.v6)?;
        if v4.is_none() && v6.is_none() {
            return Err(inconsistent("no address pool recorded"));
        }

        let mut state = LeaserState {
            v4,
            v6,
            ..LeaserState::default()
        };
        let mut seen_cidrs = HashSet::new();

        for (records, is_free) in [(self.allocated, false), (self.free, true)] {
            for record in records {
                let block = restore_block(&state, record, is_free)?;
                if !seen_cidrs.insert(block.cidr()) {
                    return Err(inconsistent(format!(
                        "block range {} recorded twice",
                        block.cidr()
                    )));
                }
                if state.allocated.contains_key(block.id()) || state.free.contains_key(block.id()) {
                    return Err(inconsistent(format!("block id {} recorded twice", block.id())));
                }

                let target: &mut BTreeMap<BlockId, Block> = if is_free {
                    &mut state.free
                } else {
                    &mut state.allocated
                };
                target.insert(block.id().clone(), block);
            }
        }

        Ok(BlockAllocator::from_state(state))
    }
}

impl From<&AddressPool> for PoolRecord {
    fn from(pool: &AddressPool) -> Self {
        Self {
            pool: pool.cidr(),
            block_prefix: pool.block_prefix(),
            next_block: pool.next_block(),
        }
    }
}

impl From<&Block> for BlockRecord {
    fn from(block: &Block) -> Self {
        Self {
            id: block.id().clone(),
            family: block.family(),
            cidr: block.cidr().to_string(),
            next_address: block.next_address(),
            allocated: block.allocated().copied().collect(),
            free: block.free().copied().collect(),
        }
    }
}

fn inconsistent(reason: impl Into<String>) -> SnapshotError {
    SnapshotError::Inconsistent(reason.into())
}

fn restore_pool(
    family: Family,
    record: Option<PoolRecord>,
) -> Result<Option<AddressPool>, SnapshotError> {
    let Some(record) = record else {
        return Ok(None);
    };

    let mut pool = AddressPool::parse(family, &record.pool, record.block_prefix)
        .map_err(|e| inconsistent(e.to_string()))?;
    if let Some(pool) = pool.as_mut() {
        if !pool.set_next_block(record.next_block) {
            return Err(inconsistent(format!(
                "{family} next block index {} is beyond pool {}",
                record.next_block,
                pool.cidr()
            )));
        }
    }
    Ok(pool)
}

fn restore_block(
    state: &LeaserState,
    record: BlockRecord,
    is_free: bool,
) -> Result<Block, SnapshotError> {
    let id = record.id;
    let cidr: IpNetwork = record
        .cidr
        .parse()
        .map_err(|_| inconsistent(format!("block {id}: bad range '{}'", record.cidr)))?;

    if Family::of(&cidr.ip()) != record.family {
        return Err(inconsistent(format!(
            "block {id}: range {cidr} is not {}",
            record.family
        )));
    }
    let pool = state
        .pool(record.family)
        .ok_or_else(|| inconsistent(format!("block {id}: no {} pool", record.family)))?;
    if !pool.owns_derived(&cidr) {
        return Err(inconsistent(format!(
            "block {id}: {cidr} was never derived from pool {}",
            pool.cidr()
        )));
    }

    let probe = Block::new(id.clone(), cidr);
    if record.next_address < FIRST_ADDRESS_INDEX
        || u128::from(record.next_address) > probe.capacity()
    {
        return Err(inconsistent(format!(
            "block {id}: next address index {} out of range",
            record.next_address
        )));
    }
    if is_free
        && (record.next_address != FIRST_ADDRESS_INDEX
            || !record.allocated.is_empty()
            || !record.free.is_empty())
    {
        return Err(inconsistent(format!("free block {id} still carries leases")));
    }

    let mut allocated = BTreeSet::new();
    let mut free = BTreeSet::new();
    for (addrs, target) in [(record.allocated, &mut allocated), (record.free, &mut free)] {
        for addr in addrs {
            let derived = probe
                .index_of(&addr)
                .is_some_and(|i| i >= u128::from(FIRST_ADDRESS_INDEX) && i < u128::from(record.next_address));
            if !derived {
                return Err(inconsistent(format!(
                    "block {id}: address {addr} was never issued"
                )));
            }
            if !target.insert(addr) {
                return Err(inconsistent(format!("block {id}: address {addr} listed twice")));
            }
        }
    }
    if let Some(addr) = allocated.intersection(&free).next() {
        return Err(inconsistent(format!(
            "block {id}: address {addr} is both leased and free"
        )));
    }

    Ok(Block::from_parts(id, cidr, record.next_address, allocated, free))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::PoolSpec;

    fn busy_allocator() -> BlockAllocator {
        let lsr = BlockAllocator::new(
            PoolSpec::new("192.168.0.0/16", 24),
            PoolSpec::new("fe80::/48", 64),
        )
        .unwrap();
        let a = lsr.get_block(4).unwrap();
        let b = lsr.get_block(4).unwrap();
        let c = lsr.get_block(6).unwrap();
        for _ in 0..3 {
            lsr.get_address(a.id.as_str()).unwrap();
        }
        lsr.return_address(a.id.as_str(), "192.168.0.2").unwrap();
        lsr.get_address(c.id.as_str()).unwrap();
        lsr.return_block(b.id.as_str()).unwrap();
        lsr
    }

    #[test]
    fn capture_mirrors_allocator() {
        let record = SnapshotRecord::capture(&busy_allocator());
        let v4 = record.v4.as_ref().unwrap();
        assert_eq!(v4.pool, "192.168.0.0/16");
        assert_eq!(v4.next_block, 2);
        assert_eq!(record.v6.as_ref().unwrap().next_block, 1);
        assert_eq!(record.allocated.len(), 2);
        assert_eq!(record.free.len(), 1);

        let a = record
            .allocated
            .iter()
            .find(|b| b.cidr == "192.168.0.0/24")
            .unwrap();
        assert_eq!(a.next_address, 4);
        assert_eq!(a.allocated.len(), 2);
        assert_eq!(a.free, vec!["192.168.0.2".parse::<IpAddr>().unwrap()]);
    }

    #[test]
    fn restored_allocator_matches_capture() {
        let record = SnapshotRecord::capture(&busy_allocator());
        let restored = record.clone().into_allocator().unwrap();
        assert_eq!(SnapshotRecord::capture(&restored), record);
    }

    #[test]
    fn rejects_pool_that_no_longer_validates() {
        let mut record = SnapshotRecord::capture(&busy_allocator());
        record.v4.as_mut().unwrap().block_prefix = 8;
        assert!(matches!(
            record.into_allocator(),
            Err(SnapshotError::Inconsistent(_))
        ));
    }

    #[test]
    fn rejects_record_without_pools() {
        assert!(SnapshotRecord::default().into_allocator().is_err());
    }

    #[test]
    fn rejects_blocks_outside_derived_range() {
        let mut record = SnapshotRecord::capture(&busy_allocator());
        record.allocated[0].cidr = "192.168.9.0/24".into();
        assert!(record.into_allocator().is_err());
    }

    #[test]
    fn rejects_unissued_addresses() {
        let mut record = SnapshotRecord::capture(&busy_allocator());
        let block = record
            .allocated
            .iter_mut()
            .find(|b| b.family == Family::V4)
            .unwrap();
        block.allocated.push("192.168.0.200".parse().unwrap());
        assert!(record.into_allocator().is_err());
    }

    #[test]
    fn rejects_duplicate_ids() {
        let mut record = SnapshotRecord::capture(&busy_allocator());
        record.free[0].id = record.allocated[0].id.clone();
        assert!(record.into_allocator().is_err());
    }

    #[test]
    fn rejects_block_of_unconfigured_family() {
        let mut record = SnapshotRecord::capture(&busy_allocator());
        record.v6 = None;
        assert!(record.into_allocator().is_err());
    }
}
