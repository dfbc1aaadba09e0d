//! LLM module - provider transports
//!
//! Provides the completion transport abstraction with Anthropic and OpenAI
//! implementations, plus normalization of their two tool-call wire shapes.

pub mod anthropic;
pub mod models;
pub mod openai;
pub mod traits;
pub mod wire;

pub use anthropic::AnthropicTransport;
pub use models::{create_transport, Provider};
pub use openai::OpenAiTransport;
pub use traits::{CompletionRequest, CompletionResponse, CompletionTransport, TokenUsage};
