pub mod engine;
pub mod runtime;

// Re-export the runtime functions so frontends can simply do:
pub use runtime::{collect_status, run_offline, run_service_mode};
