//! ## blocklease-core::snapshot
//! **Durable allocator state**
//!
//! - `record/`: Serializable mirror of the allocator and its validation on load
//! - `store/`: Atomic file writes, change detection and the periodic saver

pub mod record;
pub mod store;

pub use record::{BlockRecord, PoolRecord, SnapshotRecord};
pub use store::{SaveOutcome, SaveStats, SnapshotStore, DEFAULT_SAVE_INTERVAL};
