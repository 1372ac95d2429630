//! ## blocklease-core::alloc::pool
//! **Top-level address pools**
//!
//! An [`AddressPool`] is one configured network range for a single family,
//! cut into fixed-size blocks. Blocks are derived lazily in index order and
//! an index is never handed out twice.

use std::net::IpAddr;

use ipnetwork::{IpNetwork, Ipv4Network, Ipv6Network};

use crate::error::PoolError;
use crate::family::{addr_to_bits, span, Family};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressPool {
    network: IpNetwork,
    block_prefix: u8,
    next_block: u64,
}

impl AddressPool {
    /// Validates a `(cidr, block prefix)` pair for `family`.
    ///
    /// An empty `cidr` means the family is not configured and yields `Ok(None)`.
    /// Host bits in `cidr` are dropped, so `192.168.0.1/16` becomes `192.168.0.0/16`.
    pub fn parse(family: Family, cidr: &str, block_prefix: u8) -> Result<Option<Self>, PoolError> {
        let cidr = cidr.trim();
        if cidr.is_empty() {
            return Ok(None);
        }

        let invalid = || PoolError::InvalidCidr {
            family,
            cidr: cidr.to_string(),
        };

        let network = match family {
            Family::V4 => {
                let net: Ipv4Network = cidr.parse().map_err(|_| invalid())?;
                IpNetwork::V4(Ipv4Network::new(net.network(), net.prefix()).map_err(|_| invalid())?)
            }
            Family::V6 => {
                let net: Ipv6Network = cidr.parse().map_err(|_| invalid())?;
                IpNetwork::V6(Ipv6Network::new(net.network(), net.prefix()).map_err(|_| invalid())?)
            }
        };

        // A block must be strictly inside the pool and hold more than one address.
        if block_prefix <= network.prefix() || block_prefix >= family.width() {
            return Err(PoolError::BlockPrefixOutOfRange {
                family,
                pool: network.prefix(),
                block: block_prefix,
                width: family.width(),
            });
        }

        Ok(Some(Self {
            network,
            block_prefix,
            next_block: 0,
        }))
    }

    pub fn family(&self) -> Family {
        Family::of(&self.network.ip())
    }

    pub fn network(&self) -> IpNetwork {
        self.network
    }

    pub fn cidr(&self) -> String {
        self.network.to_string()
    }

    pub fn block_prefix(&self) -> u8 {
        self.block_prefix
    }

    /// Index of the next block that has never been derived.
    pub fn next_block(&self) -> u64 {
        self.next_block
    }

    /// Number of blocks the pool can ever yield: `2^(block prefix - pool prefix)`.
    pub fn block_count(&self) -> u128 {
        span(self.network.prefix(), self.block_prefix)
    }

    /// Number of blocks not yet derived.
    pub fn remaining(&self) -> u128 {
        self.block_count()
            .saturating_sub(u128::from(self.next_block))
    }

    /// Derives the block at the next index and advances the index.
    ///
    /// Returns `None` once every block has been derived.
    pub fn derive_next(&mut self) -> Option<IpNetwork> {
        let block = self.nth_block(self.next_block)?;
        self.next_block = self.next_block.checked_add(1)?;
        Some(block)
    }

    /// The `index`-th block of the pool, if it exists.
    pub fn nth_block(&self, index: u64) -> Option<IpNetwork> {
        if u128::from(index) >= self.block_count() {
            return None;
        }

        let family = self.family();
        let offset = u128::from(index) << (family.width() - self.block_prefix);
        let base = addr_to_bits(self.network.network());
        let addr = family.addr_from_bits(base + offset);
        network_of(addr, self.block_prefix)
    }

    /// Whether `block` is a properly aligned block of this pool that has
    /// already been derived.
    pub(crate) fn owns_derived(&self, block: &IpNetwork) -> bool {
        if block.prefix() != self.block_prefix || !self.network.contains(block.network()) {
            return false;
        }
        let shift = self.family().width() - self.block_prefix;
        let offset = addr_to_bits(block.ip()) - addr_to_bits(self.network.network());
        offset & ((1u128 << shift) - 1) == 0 && (offset >> shift) < u128::from(self.next_block)
    }

    pub(crate) fn set_next_block(&mut self, index: u64) -> bool {
        if u128::from(index) > self.block_count() {
            return false;
        }
        self.next_block = index;
        true
    }
}

pub(crate) fn network_of(addr: IpAddr, prefix: u8) -> Option<IpNetwork> {
    match addr {
        IpAddr::V4(v4) => Ipv4Network::new(v4, prefix).ok().map(IpNetwork::V4),
        IpAddr::V6(v6) => Ipv6Network::new(v6, prefix).ok().map(IpNetwork::V6),
    }
}
