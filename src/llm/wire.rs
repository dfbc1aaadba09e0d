//! Wire-shape normalization for tool invocations
//!
//! The two supported providers represent a requested tool call differently:
//! OpenAI-style calls carry a `function` object with JSON-encoded string
//! arguments, Anthropic-style tool_use blocks carry an `input` object. Both
//! are normalized here into [`ToolInvocationRequest`] so nothing downstream
//! branches on provider identity.

use rand::distr::{Alphanumeric, SampleString};
use serde::Deserialize;

use crate::core::{EnsembleError, Result, ToolInvocationRequest};

/// OpenAI-style function payload
#[derive(Debug, Deserialize)]
pub struct WireFunction {
    pub name: String,
    /// JSON object, encoded as a string
    pub arguments: String,
}

/// Tagged union over the two supported provider shapes
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum WireToolCall {
    /// OpenAI chat-completions shape
    Function { id: String, function: WireFunction },
    /// Anthropic tool_use block shape
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
}

impl WireToolCall {
    /// Normalize into the engine's single invocation shape
    pub fn into_request(self) -> Result<ToolInvocationRequest> {
        match self {
            WireToolCall::Function { id, function } => {
                let arguments: serde_json::Value = serde_json::from_str(&function.arguments)
                    .map_err(|e| {
                        EnsembleError::unsupported_shape(format!(
                            "function arguments for '{}' are not valid JSON: {}",
                            function.name, e
                        ))
                    })?;
                Ok(ToolInvocationRequest::new(id, function.name, arguments))
            }
            WireToolCall::ToolUse { id, name, input } => {
                Ok(ToolInvocationRequest::new(id, name, input))
            }
        }
    }
}

/// Normalize a raw provider tool-call value
///
/// A value matching neither shape is fatal: it indicates a provider contract
/// change, not a recoverable conversational failure.
pub fn normalize_tool_call(value: serde_json::Value) -> Result<ToolInvocationRequest> {
    let call: WireToolCall = serde_json::from_value(value.clone()).map_err(|_| {
        EnsembleError::unsupported_shape(format!("tool call matches neither provider shape: {}", value))
    })?;
    call.into_request()
}

/// Generate a short invocation id
///
/// Provider-assigned ids are replaced with short unique ones to keep the
/// replayed history compact.
pub fn generate_invocation_id() -> String {
    let suffix = Alphanumeric.sample_string(&mut rand::rng(), 4);
    format!("toolu_{}", suffix)
}
