//! Capability registry
//!
//! Maps a capability name to an invocable function plus its declared
//! parameter schema. The registry is an explicit value constructed at
//! manager setup time and read-only for the duration of a run.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::core::{EnsembleError, Result, ToolDefinition};

/// Name of the reserved orchestration capability
pub const TRANSFER_TOOL: &str = "transfer_to_agent";

/// Value returned by a capability invocation
#[derive(Debug, Clone)]
pub enum ToolOutput {
    /// Plain text output
    Text(String),
    /// Output with an auxiliary binary image payload
    Image {
        caption: Option<String>,
        base64: String,
    },
    /// Agent-transfer request, surfaced distinctly by the dispatcher
    Handoff {
        to_agent_id: String,
        message: String,
    },
}

impl ToolOutput {
    /// Stringified form folded into the conversation
    pub fn content(&self) -> String {
        match self {
            ToolOutput::Text(text) => text.clone(),
            ToolOutput::Image { caption, .. } => caption
                .clone()
                .unwrap_or_else(|| "[image attached]".to_string()),
            ToolOutput::Handoff { to_agent_id, .. } => {
                format!("Transferring to agent '{}'", to_agent_id)
            }
        }
    }
}

type CapabilityFuture = Pin<Box<dyn Future<Output = Result<ToolOutput>> + Send>>;
type CapabilityFn = Arc<dyn Fn(Vec<serde_json::Value>) -> CapabilityFuture + Send + Sync>;

/// A named, schema-described invocable function
pub struct Capability {
    definition: ToolDefinition,
    handler: CapabilityFn,
}

impl Capability {
    /// Wrap an async function
    pub fn from_async<F, Fut>(definition: ToolDefinition, f: F) -> Self
    where
        F: Fn(Vec<serde_json::Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutput>> + Send + 'static,
    {
        Self {
            definition,
            handler: Arc::new(move |args| Box::pin(f(args))),
        }
    }

    /// Wrap a synchronous function, offloaded to the blocking worker pool
    /// so it cannot stall sibling invocations or the caller's event loop
    pub fn from_blocking<F>(definition: ToolDefinition, f: F) -> Self
    where
        F: Fn(Vec<serde_json::Value>) -> Result<ToolOutput> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Self::from_async(definition, move |args| {
            let f = f.clone();
            async move {
                tokio::task::spawn_blocking(move || f(args))
                    .await
                    .map_err(|e| EnsembleError::tool(format!("blocking task failed: {}", e)))?
            }
        })
    }

    pub fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    /// Invoke with positional arguments in declared parameter order
    pub fn invoke(&self, args: Vec<serde_json::Value>) -> CapabilityFuture {
        (self.handler)(args)
    }

    /// Map a keyed argument payload into positional call arguments
    /// following the declared parameter order; missing keys become null.
    pub fn positional_args(&self, arguments: &serde_json::Value) -> Vec<serde_json::Value> {
        self.definition
            .parameter_order
            .iter()
            .map(|key| arguments.get(key).cloned().unwrap_or(serde_json::Value::Null))
            .collect()
    }
}

/// Registry of available capabilities
#[derive(Default)]
pub struct ToolRegistry {
    capabilities: HashMap<String, Arc<Capability>>,
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability, replacing any previous one with the same name
    pub fn register(&mut self, capability: Capability) {
        self.capabilities.insert(
            capability.definition().name.clone(),
            Arc::new(capability),
        );
    }

    /// Look up a capability by name
    pub fn resolve(&self, name: &str) -> Option<Arc<Capability>> {
        self.capabilities.get(name).cloned()
    }

    /// Registered capability names, sorted for stable error messages
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.capabilities.keys().cloned().collect();
        names.sort();
        names
    }

    /// All capability schemas
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.capabilities
            .values()
            .map(|c| c.definition().clone())
            .collect()
    }

    /// Schemas for the named subset, in the order given
    pub fn definitions_for(&self, names: &[String]) -> Vec<ToolDefinition> {
        names
            .iter()
            .filter_map(|name| self.capabilities.get(name))
            .map(|c| c.definition().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

/// Build the reserved agent-transfer capability
pub fn transfer_capability() -> Capability {
    let definition = ToolDefinition::new(
        TRANSFER_TOOL,
        "Transfer the conversation to another agent by id, carrying a message as context.",
        serde_json::json!({
            "type": "object",
            "properties": {
                "to_agent_id": {
                    "type": "string",
                    "description": "Id of the target agent"
                },
                "message": {
                    "type": "string",
                    "description": "Message to hand to the target agent"
                }
            },
            "required": ["to_agent_id", "message"]
        }),
        ["to_agent_id", "message"],
    );

    Capability::from_async(definition, |args| async move {
        let to_agent_id = args
            .first()
            .and_then(|v| v.as_str())
            .ok_or_else(|| EnsembleError::tool("transfer_to_agent requires 'to_agent_id'"))?
            .to_string();
        let message = args
            .get(1)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        Ok(ToolOutput::Handoff {
            to_agent_id,
            message,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_definition() -> ToolDefinition {
        ToolDefinition::new(
            "echo",
            "Echo the input back",
            json!({
                "type": "object",
                "properties": {"text": {"type": "string"}},
                "required": ["text"]
            }),
            ["text"],
        )
    }

    #[tokio::test]
    async fn test_register_and_invoke() {
        let mut registry = ToolRegistry::new();
        registry.register(Capability::from_async(echo_definition(), |args| async move {
            let text = args[0].as_str().unwrap_or_default().to_string();
            Ok(ToolOutput::Text(text))
        }));

        let capability = registry.resolve("echo").unwrap();
        let args = capability.positional_args(&json!({"text": "hello"}));
        let output = capability.invoke(args).await.unwrap();
        assert_eq!(output.content(), "hello");
    }

    #[tokio::test]
    async fn test_blocking_capability_offloaded() {
        let mut registry = ToolRegistry::new();
        registry.register(Capability::from_blocking(echo_definition(), |args| {
            Ok(ToolOutput::Text(
                args[0].as_str().unwrap_or_default().to_uppercase(),
            ))
        }));

        let capability = registry.resolve("echo").unwrap();
        let output = capability
            .invoke(vec![json!("quiet")])
            .await
            .unwrap();
        assert_eq!(output.content(), "QUIET");
    }

    #[test]
    fn test_positional_mapping_fills_missing_with_null() {
        let definition = ToolDefinition::new(
            "pair",
            "Takes two arguments",
            json!({"type": "object", "properties": {}}),
            ["first", "second"],
        );
        let capability =
            Capability::from_async(definition, |_| async move { Ok(ToolOutput::Text(String::new())) });

        let args = capability.positional_args(&json!({"second": 2}));
        assert_eq!(args, vec![serde_json::Value::Null, json!(2)]);
    }

    #[test]
    fn test_resolve_unknown_name() {
        let registry = ToolRegistry::new();
        assert!(registry.resolve("missing").is_none());
    }

    #[tokio::test]
    async fn test_transfer_capability_returns_handoff() {
        let capability = transfer_capability();
        let args = capability.positional_args(&json!({
            "to_agent_id": "agent_b",
            "message": "take over"
        }));
        let output = capability.invoke(args).await.unwrap();
        match output {
            ToolOutput::Handoff {
                to_agent_id,
                message,
            } => {
                assert_eq!(to_agent_id, "agent_b");
                assert_eq!(message, "take over");
            }
            other => panic!("expected handoff, got {:?}", other),
        }
    }
}
