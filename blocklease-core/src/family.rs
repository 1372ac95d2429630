//! IP address family designation and the integer arithmetic both families share.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};

use crate::error::LeaseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Family {
    #[serde(rename = "v4")]
    V4,
    #[serde(rename = "v6")]
    V6,
}

impl Family {
    /// Address width in bits.
    pub const fn width(self) -> u8 {
        match self {
            Family::V4 => 32,
            Family::V6 => 128,
        }
    }

    pub const fn version(self) -> u8 {
        match self {
            Family::V4 => 4,
            Family::V6 => 6,
        }
    }

    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => Family::V4,
            IpAddr::V6(_) => Family::V6,
        }
    }

    /// Builds an address of this family from its integer value.
    ///
    /// IPv4 values are truncated to the low 32 bits.
    pub(crate) fn addr_from_bits(self, bits: u128) -> IpAddr {
        match self {
            Family::V4 => IpAddr::V4(Ipv4Addr::from(bits as u32)),
            Family::V6 => IpAddr::V6(Ipv6Addr::from(bits)),
        }
    }
}

pub(crate) fn addr_to_bits(addr: IpAddr) -> u128 {
    match addr {
        IpAddr::V4(v4) => u128::from(u32::from(v4)),
        IpAddr::V6(v6) => u128::from(v6),
    }
}

/// Number of `/sub` ranges inside a `/prefix` range. `sub - prefix` must be < 128.
pub(crate) fn span(prefix: u8, sub: u8) -> u128 {
    1u128 << (sub - prefix)
}

impl TryFrom<u8> for Family {
    type Error = LeaseError;

    fn try_from(version: u8) -> Result<Self, Self::Error> {
        match version {
            4 => Ok(Family::V4),
            6 => Ok(Family::V6),
            other => Err(LeaseError::InvalidFamily(other)),
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Family::V4 => f.write_str("IPv4"),
            Family::V6 => f.write_str("IPv6"),
        }
    }
}
