//! Custom error types for the engine
//!
//! Splits failures into two kinds: fatal engine errors ([`EnsembleError`],
//! raised through `Result`) and transport-level failures ([`TransportError`],
//! carried as data inside a completion response so a conversation can keep
//! going after a provider hiccup).

use thiserror::Error;

/// Provider transport failure, modeled as data rather than a raised error.
///
/// These never escape the agent completion loop: they are recorded into the
/// conversation history and returned to the caller inside the response.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// The provider endpoint could not be reached
    #[error("The server could not be reached. {0}")]
    Connection(String),

    /// A 429 status code was received
    #[error("A 429 status code was received; we should back off a bit. {0}")]
    RateLimit(String),

    /// Another non-200-range status code was received
    #[error("Non-200-range status code {code} was received. {message}")]
    Status { code: u16, message: String },
}

/// Main error type for engine operations
#[derive(Error, Debug)]
pub enum EnsembleError {
    /// Tool invocation request matched neither supported provider shape
    #[error("Unsupported tool invocation shape: {0}")]
    UnsupportedInvocationShape(String),

    /// Tool execution errors that cannot be converted into a tool result
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// Referenced agent is not registered with the manager
    #[error("Agent '{0}' not found")]
    AgentNotFound(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error for other cases
    #[error("{0}")]
    Other(String),
}

/// Convenience Result type for engine operations
pub type Result<T> = std::result::Result<T, EnsembleError>;

impl EnsembleError {
    /// Create a tool execution error
    pub fn tool(msg: impl Into<String>) -> Self {
        Self::ToolExecution(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an unsupported-shape error
    pub fn unsupported_shape(msg: impl Into<String>) -> Self {
        Self::UnsupportedInvocationShape(msg.into())
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}
