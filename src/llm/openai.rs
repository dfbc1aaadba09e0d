//! OpenAI chat-completions transport
//!
//! Marshals normalized turns into the chat-completions shape: tool results
//! travel as `tool`-role messages, assistant tool requests as a
//! `tool_calls` array with JSON-encoded string arguments.

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::core::{Config, Message, Result, Role, TransportError};
use crate::llm::traits::{CompletionRequest, CompletionResponse, CompletionTransport, TokenUsage};
use crate::llm::wire;

/// OpenAI API transport
#[derive(Clone)]
pub struct OpenAiTransport {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    model: String,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

impl OpenAiTransport {
    /// Create a transport from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.providers.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.providers.openai_base_url.clone(),
            api_key: config.providers.openai_key()?,
        })
    }

    fn build_messages(&self, messages: &[Message]) -> Vec<serde_json::Value> {
        let mut wire_messages = Vec::new();

        for message in messages {
            match message.role {
                Role::Tool => {
                    for result in message.tool_results.iter().flatten() {
                        wire_messages.push(json!({
                            "role": "tool",
                            "tool_call_id": result.invocation_id,
                            "name": result.name,
                            "content": result.content,
                        }));
                    }
                }
                Role::Assistant if message.tool_calls.is_some() => {
                    let calls: Vec<serde_json::Value> = message
                        .tool_calls
                        .iter()
                        .flatten()
                        .map(|call| {
                            json!({
                                "id": call.id,
                                "type": "function",
                                "function": {
                                    "name": call.name,
                                    "arguments": call.arguments.to_string(),
                                },
                            })
                        })
                        .collect();
                    wire_messages.push(json!({
                        "role": "assistant",
                        "content": message.content,
                        "tool_calls": calls,
                    }));
                }
                _ => {
                    wire_messages.push(json!({
                        "role": message.role.to_string(),
                        "content": format_content(message),
                    }));
                }
            }
        }

        wire_messages
    }
}

fn format_content(message: &Message) -> String {
    match &message.name {
        Some(name) if message.role != Role::System => {
            format!("[{}]: {}", name, message.content)
        }
        _ => message.content.clone(),
    }
}

#[async_trait::async_trait]
impl CompletionTransport for OpenAiTransport {
    async fn send(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        let mut body = json!({
            "model": request.model,
            "messages": self.build_messages(&request.messages),
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });

        if !request.tools.is_empty() {
            let tools: Vec<serde_json::Value> = request
                .tools
                .iter()
                .map(|tool| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool.parameters,
                        },
                    })
                })
                .collect();
            body["tools"] = serde_json::Value::Array(tools);
            body["tool_choice"] = json!("auto");
        }

        let url = format!("{}/v1/chat/completions", self.base_url);
        debug!(model = %request.model, messages = request.messages.len(), "sending completion request");

        let response = match self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
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

        let parsed: ChatCompletion = response.json().await?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| crate::core::EnsembleError::other("completion carried no choices"))?;

        let mut tool_calls = Vec::new();
        for raw_call in choice.message.tool_calls.into_iter().flatten() {
            tool_calls.push(wire::normalize_tool_call(raw_call)?);
        }

        let usage = parsed.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(CompletionResponse {
            model: parsed.model,
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
            usage,
            error: None,
        })
    }

    fn name(&self) -> &str {
        "openai"
    }
}
