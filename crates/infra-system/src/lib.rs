// atbridge Infrastructure - System Adapters
// Implements: ProcessInvoker

pub mod subprocess_invoker;

pub use subprocess_invoker::SubprocessInvoker;
