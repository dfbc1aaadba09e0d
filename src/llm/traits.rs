//! Completion transport contract
//!
//! Abstracts the provider call behind one trait so the agent, dispatcher,
//! and manager never branch on provider identity.

use async_trait::async_trait;

use crate::core::{Message, Result, ToolDefinition, ToolInvocationRequest, TransportError};

/// Token usage information
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A completion request sent to a provider
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Model identifier
    pub model: String,
    /// Ordered conversation turns, system instruction at the head
    pub messages: Vec<Message>,
    /// Capability schemas exposed to the model
    pub tools: Vec<ToolDefinition>,
    /// Sampling temperature
    pub temperature: f32,
    /// Maximum tokens to generate
    pub max_tokens: u32,
}

/// Normalized provider response
///
/// Transport-level failures are carried in `error` rather than raised, so
/// the conversation can record the failed exchange and continue. Text and
/// tool invocations may coexist (preamble text before tool calls).
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Model that generated the response
    pub model: String,
    /// Extracted text content
    pub content: String,
    /// Extracted tool invocations, already normalized
    pub tool_calls: Vec<ToolInvocationRequest>,
    /// Token usage, when the provider reports it
    pub usage: Option<TokenUsage>,
    /// Transport-level failure, if the request did not complete
    pub error: Option<TransportError>,
}

impl CompletionResponse {
    /// Build a response wrapping a transport failure
    pub fn from_error(model: impl Into<String>, error: TransportError) -> Self {
        Self {
            model: model.into(),
            content: String::new(),
            tool_calls: Vec::new(),
            usage: None,
            error: Some(error),
        }
    }

    /// Extracted text, or the error message for failed requests
    pub fn text(&self) -> String {
        if let Some(ref error) = self.error {
            return error.to_string();
        }
        self.content.clone()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Convert into a history turn attributed to the given agent
    ///
    /// Failed exchanges become plain assistant turns carrying the error
    /// text, preserving the interaction and avoiding immediate retry loops.
    pub fn to_message(&self, agent_id: &str) -> Message {
        if self.tool_calls.is_empty() {
            Message::assistant(self.text()).from_agent(agent_id)
        } else {
            Message::tool_requests(self.content.clone(), self.tool_calls.clone())
                .from_agent(agent_id)
        }
    }
}

/// Trait for provider transports
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    /// Send one completion request
    ///
    /// Connection, rate-limit, and status failures come back as data inside
    /// the response; `Err` is reserved for fatal engine errors such as an
    /// unsupported invocation shape.
    async fn send(&self, request: &CompletionRequest) -> Result<CompletionResponse>;

    /// Provider name
    fn name(&self) -> &str;
}
