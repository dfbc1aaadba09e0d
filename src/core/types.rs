//! Shared types used across engine modules
//!
//! Contains conversation turns, normalized tool invocations, tool schemas,
//! handoff payloads, and per-run bookkeeping.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// A turn in a conversation
///
/// Providers marshal this into their own wire shapes; the engine itself
/// never branches on provider identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender
    pub role: Role,
    /// Text content of the message
    pub content: String,
    /// Id of the agent that authored this turn, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Tool invocations requested by the assistant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolInvocationRequest>>,
    /// Tool results folded back into the conversation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_results: Option<Vec<ToolInvocationResult>>,
}

impl Message {
    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            name: None,
            tool_calls: None,
            tool_results: None,
        }
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            name: None,
            tool_calls: None,
            tool_results: None,
        }
    }

    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            name: None,
            tool_calls: None,
            tool_results: None,
        }
    }

    /// Create an assistant message that requests tool invocations
    pub fn tool_requests(content: impl Into<String>, calls: Vec<ToolInvocationRequest>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            name: None,
            tool_calls: Some(calls),
            tool_results: None,
        }
    }

    /// Create a tool-role message carrying a batch of results
    pub fn tool_results(results: Vec<ToolInvocationResult>) -> Self {
        Self {
            role: Role::Tool,
            content: String::new(),
            name: None,
            tool_calls: None,
            tool_results: Some(results),
        }
    }

    /// Attach the authoring agent's id
    pub fn from_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.name = Some(agent_id.into());
        self
    }
}

/// A tool invocation requested by the model, normalized over both
/// supported provider shapes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolInvocationRequest {
    /// Provider-assigned invocation id, used for request/result correlation
    pub id: String,
    /// Name of the capability to invoke
    pub name: String,
    /// Keyed argument payload
    pub arguments: serde_json::Value,
}

impl ToolInvocationRequest {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Get a string argument by key
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.arguments
            .get(key)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }
}

/// Result of one tool invocation
///
/// A batch of these keeps a 1:1 correspondence, by `invocation_id`, with the
/// batch of requests it answers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolInvocationResult {
    /// Id of the invocation this result answers
    pub invocation_id: String,
    /// Name of the invoked capability
    pub name: String,
    /// Stringified tool output, or the error message
    pub content: String,
    /// Whether the invocation failed
    pub is_error: bool,
}

impl ToolInvocationResult {
    /// Create a successful result
    pub fn success(
        invocation_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            name: name.into(),
            content: content.into(),
            is_error: false,
        }
    }

    /// Create a failed result
    pub fn error(
        invocation_id: impl Into<String>,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            name: name.into(),
            content: message.into(),
            is_error: true,
        }
    }
}

/// Schema of a capability exposed to the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Capability name
    pub name: String,
    /// Description of what the capability does
    pub description: String,
    /// JSON Schema for the keyed parameters
    pub parameters: serde_json::Value,
    /// Declared parameter order, used to map keyed arguments into
    /// positional call arguments
    pub parameter_order: Vec<String>,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
        parameter_order: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            parameter_order: parameter_order.into_iter().map(Into::into).collect(),
        }
    }
}

/// Control and context carried by an agent transfer
///
/// Produced by the `transfer_to_agent` capability (or synthesized by the
/// manager when a non-primary agent finishes), consumed exactly once.
#[derive(Debug, Clone)]
pub struct HandoffResult {
    pub from_agent_id: String,
    pub to_agent_id: String,
    /// One or more turns seeding the new active agent's context, in order
    pub context: Vec<Message>,
}

/// Per-run budget and bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: String,
    /// Maximum turns per run
    pub max_turns: usize,
    pub current_turn: usize,
    /// Ask for confirmation on every turn
    pub enable_turn_debug: bool,
    pub enable_external_memory: bool,
    pub last_user_message: String,
    pub user_messages: Vec<String>,
}

impl Default for RunMetadata {
    fn default() -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            max_turns: 6,
            current_turn: 0,
            enable_turn_debug: false,
            enable_external_memory: false,
            last_user_message: String::new(),
            user_messages: Vec::new(),
        }
    }
}

impl RunMetadata {
    pub fn new(max_turns: usize) -> Self {
        Self {
            max_turns,
            ..Default::default()
        }
    }

    /// Record an incoming user message
    pub fn record_user_message(&mut self, message: &str) {
        self.last_user_message = message.to_string();
        self.user_messages.push(message.to_string());
    }
}

/// Per-completion-request depth bookkeeping, distinct from the turn count
///
/// `current_depth` counts consecutive tool-use continuations since the last
/// plain user message; it resets when a new user turn arrives or after an
/// approved continuation at the depth limit. `total_depth` is monotonic for
/// the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestDepth {
    pub current_depth: usize,
    pub total_depth: usize,
    pub max_depth: usize,
}

impl Default for RequestDepth {
    fn default() -> Self {
        Self {
            current_depth: 0,
            total_depth: 0,
            max_depth: 8,
        }
    }
}

impl RequestDepth {
    pub fn with_max(max_depth: usize) -> Self {
        Self {
            max_depth,
            ..Default::default()
        }
    }

    /// Whether the depth guard has been reached
    pub fn at_limit(&self) -> bool {
        self.current_depth >= self.max_depth
    }

    /// Count one completion round-trip
    pub fn advance(&mut self) {
        self.current_depth += 1;
        self.total_depth += 1;
    }

    /// Start a fresh continuation window; `total_depth` keeps counting
    pub fn reset_current(&mut self) {
        self.current_depth = 0;
    }
}
