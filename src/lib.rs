//! Ensemble - Multi-Agent LLM Execution Engine
//!
//! A Rust engine for running one or more LLM-backed agents: each agent owns
//! a completion/tool-use loop, tool batches run concurrently with per-call
//! timeouts and error isolation, and agents cooperate through an explicit
//! handoff protocol under turn and depth budgets.
//!
//! # Architecture
//!
//! - **Core**: Shared types, configuration, and error handling
//! - **LLM**: Completion transport abstraction with Anthropic and OpenAI
//!   implementations
//! - **Tools**: Capability registry, concurrent dispatcher, and built-ins
//! - **Agent**: Per-agent loop, conversation history, and the orchestrator
//! - **Persist**: Optional turn persistence collaborator
//!
//! # Usage
//!
//! ```rust,no_run
//! use ensemble::agent::AgentManager;
//! use ensemble::core::{AgentConfig, Config, RunMetadata};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut manager = AgentManager::new(Config::load());
//!     manager
//!         .register_agent(
//!             AgentConfig::new("main", "claude-3-5-sonnet-20241022")
//!                 .instruction("You are a helpful assistant.")
//!                 .tools(["edit", "shell"])
//!                 .primary(),
//!         )
//!         .unwrap();
//!
//!     let mut metadata = RunMetadata::default();
//!     let response = manager.run("main", "Hello!", &mut metadata).await.unwrap();
//!     println!("{}", response.text());
//! }
//! ```

pub mod agent;
pub mod core;
pub mod llm;
pub mod persist;
pub mod tools;

// Re-export commonly used items
pub use crate::agent::{Agent, AgentManager};
pub use crate::core::{AgentConfig, Config, EnsembleError, Result, RunMetadata};
pub use crate::persist::Persistence;
