//! Anthropic messages transport
//!
//! Marshals normalized turns into the Messages API shape: the system
//! instruction travels as a top-level parameter, tool results as
//! `tool_result` blocks inside a user message.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::core::{Config, Message, Result, Role, TransportError};
use crate::llm::traits::{CompletionRequest, CompletionResponse, CompletionTransport, TokenUsage};
use crate::llm::wire;

/// Anthropic API transport
#[derive(Clone)]
pub struct AnthropicTransport {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    model: String,
    content: Vec<serde_json::Value>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    content: serde_json::Value,
}

impl AnthropicTransport {
    /// Create a transport from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.providers.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.providers.anthropic_base_url.clone(),
            api_key: config.providers.anthropic_key()?,
        })
    }

    /// Extract the system instruction and marshal the remaining turns
    fn build_messages(&self, messages: &[Message]) -> (String, Vec<WireMessage>) {
        let mut system = String::new();
        let mut wire_messages: Vec<WireMessage> = Vec::new();

        for message in messages {
            match message.role {
                Role::System => {
                    if !system.is_empty() {
                        system.push_str("\n\n");
                    }
                    system.push_str(&message.content);
                }
                Role::Tool => {
                    let results: Vec<serde_json::Value> = message
                        .tool_results
                        .iter()
                        .flatten()
                        .map(|result| {
                            json!({
                                "type": "tool_result",
                                "tool_use_id": result.invocation_id,
                                "content": result.content,
                                "is_error": result.is_error,
                            })
                        })
                        .collect();
                    wire_messages.push(WireMessage {
                        role: "user".to_string(),
                        content: serde_json::Value::Array(results),
                    });
                }
                Role::Assistant if message.tool_calls.is_some() => {
                    let mut blocks = Vec::new();
                    if !message.content.is_empty() {
                        blocks.push(json!({"type": "text", "text": message.content}));
                    }
                    for call in message.tool_calls.iter().flatten() {
                        blocks.push(json!({
                            "type": "tool_use",
                            "id": call.id,
                            "name": call.name,
                            "input": call.arguments,
                        }));
                    }
                    wire_messages.push(WireMessage {
                        role: "assistant".to_string(),
                        content: serde_json::Value::Array(blocks),
                    });
                }
                Role::User | Role::Assistant => {
                    wire_messages.push(WireMessage {
                        role: message.role.to_string(),
                        content: serde_json::Value::String(format_content(message)),
                    });
                }
            }
        }

        // The API rejects a final assistant message when tools are in play:
        // it would pre-fill the assistant response.
        if let Some(last) = wire_messages.last_mut() {
            if last.role == "assistant" {
                last.role = "user".to_string();
            }
        }

        (system, wire_messages)
    }
}

/// Prefix content with the authoring agent id so peers can be addressed
fn format_content(message: &Message) -> String {
    match &message.name {
        Some(name) => format!("[{}]: {}", name, message.content),
        None => message.content.clone(),
    }
}

#[async_trait::async_trait]
impl CompletionTransport for AnthropicTransport {
    async fn send(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        let (system, messages) = self.build_messages(&request.messages);

        let mut body = json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "system": system,
            "messages": messages,
        });

        if !request.tools.is_empty() {
            let tools: Vec<serde_json::Value> = request
                .tools
                .iter()
                .map(|tool| {
                    json!({
                        "name": tool.name,
                        "description": tool.description,
                        "input_schema": tool.parameters,
                    })
                })
                .collect();
            body["tools"] = serde_json::Value::Array(tools);
            body["tool_choice"] = json!({"type": "auto"});
        }

        let url = format!("{}/v1/messages", self.base_url);
        debug!(model = %request.model, messages = request.messages.len(), "sending completion request");

        let response = match self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return Ok(CompletionResponse::from_error(
                    &request.model,
                    TransportError::Connection(e.to_string()),
                ));
            }
        };

        let status = response.status();
        if status.as_u16() == 429 {
            let message = response.text().await.unwrap_or_default();
            return Ok(CompletionResponse::from_error(
                &request.model,
                TransportError::RateLimit(message),
            ));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Ok(CompletionResponse::from_error(
                &request.model,
                TransportError::Status {
                    code: status.as_u16(),
                    message,
                },
            ));
        }

        let parsed: MessagesResponse = response.json().await?;

        let mut content = String::new();
        let mut tool_calls = Vec::new();
        for block in parsed.content {
            match block.get("type").and_then(|t| t.as_str()) {
                Some("text") => {
                    if let Some(text) = block.get("text").and_then(|t| t.as_str()) {
                        if !content.is_empty() {
                            content.push('\n');
                        }
                        content.push_str(text);
                    }
                }
                _ => {
                    // tool_use blocks, and anything unrecognized, go through
                    // the shared normalizer; provider ids are replaced with
                    // short unique ones to keep replayed history compact
                    let mut call = wire::normalize_tool_call(block)?;
                    call.id = wire::generate_invocation_id();
                    tool_calls.push(call);
                }
            }
        }

        let usage = parsed.usage.map(|u| TokenUsage {
            prompt_tokens: u.input_tokens,
            completion_tokens: u.output_tokens,
            total_tokens: u.input_tokens + u.output_tokens,
        });

        Ok(CompletionResponse {
            model: parsed.model,
            content,
            tool_calls,
            usage,
            error: None,
        })
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}
