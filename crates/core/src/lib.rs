// atbridge Core - at(1) protocol & ports
// NO process spawning here: adapters live in infra-system

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod port;

pub use config::BridgeConfig;
pub use error::{BridgeError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
