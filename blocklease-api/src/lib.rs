//! # Blocklease API
//!
//! Boundary between a container runtime's IPAM protocol adapter and the
//! block allocator. The adapter decodes its wire format into the types in
//! [`schema`] and drives an [`IpamDriver`].

pub mod driver;
pub mod schema;

pub use driver::{IpamDriver, LeaseDriver};
pub use schema::*;
