//! ## blocklease-core::alloc::block
//! **Leased blocks and the addresses inside them**
//!
//! A [`Block`] is one sub-range carved out of an [`AddressPool`](super::AddressPool).
//! Addresses are derived lazily from index 1 upwards (index 0, the network
//! address, is never issued). Returned addresses are kept on a free set and
//! preferred over deriving new ones.

use std::collections::BTreeSet;
use std::net::IpAddr;

use ipnetwork::IpNetwork;

use super::id::BlockId;
use crate::error::LeaseError;
use crate::family::{addr_to_bits, span, Family};

/// First address index a block hands out.
pub const FIRST_ADDRESS_INDEX: u64 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    id: BlockId,
    cidr: IpNetwork,
    next_address: u64,
    allocated: BTreeSet<IpAddr>,
    free: BTreeSet<IpAddr>,
}

impl Block {
    pub fn new(id: BlockId, cidr: IpNetwork) -> Self {
        Self {
            id,
            cidr,
            next_address: FIRST_ADDRESS_INDEX,
            allocated: BTreeSet::new(),
            free: BTreeSet::new(),
        }
    }

    /// Rebuilds a block from persisted parts. Consistency is checked by the caller.
    pub(crate) fn from_parts(
        id: BlockId,
        cidr: IpNetwork,
        next_address: u64,
        allocated: BTreeSet<IpAddr>,
        free: BTreeSet<IpAddr>,
    ) -> Self {
        Self {
            id,
            cidr,
            next_address,
            allocated,
            free,
        }
    }

    pub fn id(&self) -> &BlockId {
        &self.id
    }

    pub fn family(&self) -> Family {
        Family::of(&self.cidr.ip())
    }

    pub fn cidr(&self) -> IpNetwork {
        self.cidr
    }

    pub fn prefix(&self) -> u8 {
        self.cidr.prefix()
    }

    pub fn next_address(&self) -> u64 {
        self.next_address
    }

    /// Addresses in the block's range, including the never-issued index 0.
    pub fn capacity(&self) -> u128 {
        span(self.cidr.prefix(), self.family().width())
    }

    pub fn allocated(&self) -> impl Iterator<Item = &IpAddr> {
        self.allocated.iter()
    }

    pub fn free(&self) -> impl Iterator<Item = &IpAddr> {
        self.free.iter()
    }

    pub fn allocated_count(&self) -> usize {
        self.allocated.len()
    }

    pub fn is_allocated(&self, addr: &IpAddr) -> bool {
        self.allocated.contains(addr)
    }

    /// Leases one address: a returned one if any, otherwise the next derived one.
    pub fn get_address(&mut self) -> Result<IpAddr, LeaseError> {
        if let Some(addr) = self.free.pop_first() {
            self.allocated.insert(addr);
            return Ok(addr);
        }

        let addr = self.derive_next().ok_or_else(|| LeaseError::AddressPoolExhausted {
            block: self.id.clone(),
            cidr: self.cidr.to_string(),
        })?;
        self.allocated.insert(addr);
        Ok(addr)
    }

    fn derive_next(&mut self) -> Option<IpAddr> {
        let addr = self.nth_address(self.next_address)?;
        self.next_address = self.next_address.checked_add(1)?;
        Some(addr)
    }

    pub(crate) fn nth_address(&self, index: u64) -> Option<IpAddr> {
        if u128::from(index) >= self.capacity() {
            return None;
        }
        let base = addr_to_bits(self.cidr.network());
        Some(self.family().addr_from_bits(base + u128::from(index)))
    }

    /// Index of `addr` inside this block, if it lies in the block's range.
    pub(crate) fn index_of(&self, addr: &IpAddr) -> Option<u128> {
        if !self.cidr.contains(*addr) {
            return None;
        }
        Some(addr_to_bits(*addr) - addr_to_bits(self.cidr.network()))
    }

    /// Moves a leased address back to the free set.
    ///
    /// Accepts either a bare address or one with a `/prefix` suffix.
    pub fn return_address(&mut self, address: &str) -> Result<IpAddr, LeaseError> {
        let not_found = || LeaseError::AddressNotFound {
            block: self.id.clone(),
            address: address.to_string(),
        };

        let bare = address.split('/').next().unwrap_or_default().trim();
        let addr: IpAddr = bare.parse().map_err(|_| not_found())?;

        if !self.allocated.remove(&addr) {
            return Err(not_found());
        }
        self.free.insert(addr);
        Ok(addr)
    }

    /// Forgets every lease and restarts derivation at index 1.
    /// Id and range are kept so the block can be handed out again.
    pub fn reset(&mut self) {
        self.allocated.clear();
        self.free.clear();
        self.next_address = FIRST_ADDRESS_INDEX;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(cidr: &str) -> Block {
        Block::new(BlockId::from("blk"), cidr.parse().unwrap())
    }

    #[test]
    fn first_address_is_index_one() {
        let mut b = block("192.168.0.0/24");
        assert_eq!(b.get_address().unwrap().to_string(), "192.168.0.1");
        assert_eq!(b.get_address().unwrap().to_string(), "192.168.0.2");
        assert_eq!(b.next_address(), 3);

        let mut b6 = block("fe80::/64");
        assert_eq!(b6.get_address().unwrap().to_string(), "fe80::1");
    }

    #[test]
    fn returned_address_is_reused_first() {
        let mut b = block("192.168.0.0/24");
        let first = b.get_address().unwrap();
        b.get_address().unwrap();
        b.return_address(&first.to_string()).unwrap();

        assert_eq!(b.get_address().unwrap(), first);
        assert_eq!(b.next_address(), 3);
    }

    #[test]
    fn return_strips_prefix_suffix() {
        let mut b = block("192.168.0.0/24");
        b.get_address().unwrap();
        assert!(b.return_address("192.168.0.1/24").is_ok());
    }

    #[test]
    fn return_rejects_unknown_addresses() {
        let mut b = block("192.168.0.0/24");
        b.get_address().unwrap();

        for bogus in ["123.12.23.13", "192.168.0.9", "garbage", ""] {
            assert!(matches!(
                b.return_address(bogus),
                Err(LeaseError::AddressNotFound { .. })
            ));
        }

        b.return_address("192.168.0.1").unwrap();
        assert!(matches!(
            b.return_address("192.168.0.1"),
            Err(LeaseError::AddressNotFound { .. })
        ));
    }

    #[test]
    fn exhausts_small_block() {
        let mut b = block("10.0.0.0/30");
        for expected in ["10.0.0.1", "10.0.0.2", "10.0.0.3"] {
            assert_eq!(b.get_address().unwrap().to_string(), expected);
        }
        assert!(matches!(
            b.get_address(),
            Err(LeaseError::AddressPoolExhausted { .. })
        ));
    }

    #[test]
    fn reset_clears_leases() {
        let mut b = block("10.0.0.0/24");
        b.get_address().unwrap();
        let second = b.get_address().unwrap();
        b.return_address(&second.to_string()).unwrap();

        b.reset();
        assert_eq!(b.allocated_count(), 0);
        assert_eq!(b.free().count(), 0);
        assert_eq!(b.next_address(), FIRST_ADDRESS_INDEX);
        assert_eq!(b.get_address().unwrap().to_string(), "10.0.0.1");
    }

    #[test]
    fn index_of_locates_addresses() {
        let b = block("10.0.0.0/24");
        assert_eq!(b.index_of(&"10.0.0.5".parse().unwrap()), Some(5));
        assert_eq!(b.index_of(&"10.0.1.5".parse().unwrap()), None);
        assert_eq!(b.nth_address(5).unwrap().to_string(), "10.0.0.5");
        assert_eq!(b.nth_address(256), None);
    }
}
