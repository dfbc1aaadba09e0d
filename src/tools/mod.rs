//! Tools module - capability registry and concurrent dispatch

pub mod builtin;
pub mod dispatcher;
pub mod registry;

pub use builtin::register_builtins;
pub use dispatcher::{DispatchOutcome, ToolDispatcher};
pub use registry::{transfer_capability, Capability, ToolOutput, ToolRegistry, TRANSFER_TOOL};
