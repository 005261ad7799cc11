// Application Layer - Use Cases over the at(1) daemon

pub mod at_service;
pub mod classifier;
pub mod deferred;

// Re-exports
pub use at_service::AtService;
pub use classifier::{classify, Captured, InvocationOutcome};
pub use deferred::{dispatch, CallableRegistry, DeferredCall, DeferredError, DeferredTask};
