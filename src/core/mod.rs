//! Core module - shared infrastructure
//!
//! This module contains foundational types, configuration, and error handling
//! used throughout the engine.

pub mod config;
pub mod error;
pub mod types;

pub use config::{AgentConfig, Config, ProviderConfig, RuntimeConfig};
pub use error::{EnsembleError, Result, TransportError};
pub use types::*;
