mod error;
mod runtime;

pub use self::{
    error::EngineError,
    runtime::{IpamRuntime, SaverHandle, StartupOrigin},
};

pub mod prelude {
    pub use super::{EngineError, IpamRuntime, SaverHandle, StartupOrigin};
}
