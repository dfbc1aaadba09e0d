//! Agent runtime
//!
//! Per-agent completion loop, conversation history, continuation policy,
//! and the multi-agent orchestrator.

pub mod agent;
pub mod conversation;
pub mod manager;
pub mod policy;

pub use agent::Agent;
pub use conversation::Conversation;
pub use manager::AgentManager;
pub use policy::{AlwaysContinue, ContinuationPolicy, NeverContinue};
