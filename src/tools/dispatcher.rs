//! Tool dispatcher
//!
//! Executes a batch of requested tool invocations concurrently, enforcing a
//! per-call timeout, and produces exactly one reply per invocation. Nothing
//! raises out of the batch: unknown names, timeouts, and capability failures
//! all become error-tagged results.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::core::{
    HandoffResult, Message, Result, ToolInvocationRequest, ToolInvocationResult,
};
use crate::tools::registry::{ToolOutput, ToolRegistry};

/// Outcome of one dispatched batch
///
/// `results` has the same length and order as the request batch, correlated
/// by invocation id. A handoff produced by the reserved transfer capability
/// is surfaced distinctly so the orchestrator can act on it before treating
/// the batch as ordinary tool results.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    pub results: Vec<ToolInvocationResult>,
    pub handoff: Option<HandoffResult>,
    /// Base64 image payloads attached by capabilities
    pub images: Vec<String>,
}

/// Dispatches tool invocation batches against a capability registry
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
}

enum Scheduled {
    /// Produced without execution (unknown capability name)
    Ready(ToolInvocationResult),
    /// One independent unit of concurrency per invocation
    Pending {
        handle: JoinHandle<Result<ToolOutput>>,
        invocation_id: String,
        name: String,
    },
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Execute a batch of invocations with a per-call timeout
    ///
    /// All known invocations are scheduled before any is awaited; awaiting
    /// then follows submission order, which preserves request order in the
    /// results by construction. A slow early invocation delaying retrieval
    /// of an already-finished later one is an accepted tradeoff.
    pub async fn dispatch(
        &self,
        from_agent_id: &str,
        batch: &[ToolInvocationRequest],
        timeout: Duration,
    ) -> DispatchOutcome {
        debug!(
            agent = from_agent_id,
            count = batch.len(),
            "dispatching tool batch"
        );

        let mut scheduled = Vec::with_capacity(batch.len());
        for request in batch {
            match self.registry.resolve(&request.name) {
                None => {
                    let message = format!(
                        "Tool '{}' not found. The name can be only one of those names: {}.",
                        request.name,
                        self.registry.names().join(", ")
                    );
                    error!(tool = %request.name, "unknown capability requested");
                    scheduled.push(Scheduled::Ready(ToolInvocationResult::error(
                        &request.id,
                        &request.name,
                        message,
                    )));
                }
                Some(capability) => {
                    let args = capability.positional_args(&request.arguments);
                    let handle = tokio::spawn(async move { capability.invoke(args).await });
                    scheduled.push(Scheduled::Pending {
                        handle,
                        invocation_id: request.id.clone(),
                        name: request.name.clone(),
                    });
                }
            }
        }

        let mut outcome = DispatchOutcome::default();
        for entry in scheduled {
            match entry {
                Scheduled::Ready(result) => outcome.results.push(result),
                Scheduled::Pending {
                    handle,
                    invocation_id,
                    name,
                } => {
                    let abort = handle.abort_handle();
                    let result = match tokio::time::timeout(timeout, handle).await {
                        Err(_) => {
                            // best-effort cancellation; the result is
                            // discarded either way
                            abort.abort();
                            let message = format!(
                                "Timeout while calling tool <{}> after {}s.",
                                name,
                                timeout.as_secs()
                            );
                            warn!(tool = %name, "tool invocation timed out");
                            ToolInvocationResult::error(&invocation_id, &name, message)
                        }
                        Ok(Err(join_error)) => {
                            // a panic inside the capability lands here
                            let message =
                                format!("Error while calling tool <{}>: {}", name, join_error);
                            error!(tool = %name, "tool task failed: {}", join_error);
                            ToolInvocationResult::error(&invocation_id, &name, message)
                        }
                        Ok(Ok(Err(e))) => {
                            let message = format!("Error while calling tool <{}>: {}", name, e);
                            error!(tool = %name, "tool invocation failed: {}", e);
                            ToolInvocationResult::error(&invocation_id, &name, message)
                        }
                        Ok(Ok(Ok(output))) => {
                            match &output {
                                ToolOutput::Image { base64, .. } => {
                                    outcome.images.push(base64.clone());
                                }
                                ToolOutput::Handoff {
                                    to_agent_id,
                                    message,
                                } if outcome.handoff.is_none() => {
                                    outcome.handoff = Some(HandoffResult {
                                        from_agent_id: from_agent_id.to_string(),
                                        to_agent_id: to_agent_id.clone(),
                                        context: vec![Message::user(message.clone())
                                            .from_agent(from_agent_id)],
                                    });
                                }
                                _ => {}
                            }
                            ToolInvocationResult::success(&invocation_id, &name, output.content())
                        }
                    };
                    outcome.results.push(result);
                }
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ToolDefinition;
    use crate::tools::registry::{transfer_capability, Capability};
    use serde_json::json;

    fn definition(name: &str, params: &[&str]) -> ToolDefinition {
        ToolDefinition::new(
            name,
            "test capability",
            json!({"type": "object", "properties": {}}),
            params.iter().copied(),
        )
    }

    fn dispatcher(registry: ToolRegistry) -> ToolDispatcher {
        ToolDispatcher::new(Arc::new(registry))
    }

    fn request(id: &str, name: &str, args: serde_json::Value) -> ToolInvocationRequest {
        ToolInvocationRequest::new(id, name, args)
    }

    #[tokio::test]
    async fn test_batch_preserves_order_and_correlation() {
        let mut registry = ToolRegistry::new();
        registry.register(Capability::from_async(
            definition("echo", &["text"]),
            |args| async move {
                Ok(ToolOutput::Text(
                    args[0].as_str().unwrap_or_default().to_string(),
                ))
            },
        ));

        let batch = vec![
            request("a", "echo", json!({"text": "one"})),
            request("b", "missing", json!({})),
            request("c", "echo", json!({"text": "three"})),
        ];
        let outcome = dispatcher(registry)
            .dispatch("main", &batch, Duration::from_secs(5))
            .await;

        assert_eq!(outcome.results.len(), 3);
        assert_eq!(outcome.results[0].invocation_id, "a");
        assert_eq!(outcome.results[0].content, "one");
        assert!(outcome.results[1].is_error);
        assert_eq!(outcome.results[2].invocation_id, "c");
        assert_eq!(outcome.results[2].content, "three");
    }

    #[tokio::test]
    async fn test_unknown_tool_lists_registered_names() {
        let mut registry = ToolRegistry::new();
        registry.register(Capability::from_async(
            definition("echo", &["text"]),
            |_| async move { Ok(ToolOutput::Text(String::new())) },
        ));

        let outcome = dispatcher(registry)
            .dispatch(
                "main",
                &[request("x", "foo", json!({}))],
                Duration::from_secs(5),
            )
            .await;

        assert_eq!(outcome.results.len(), 1);
        assert!(outcome.results[0].is_error);
        assert!(outcome.results[0].content.contains("'foo' not found"));
        assert!(outcome.results[0].content.contains("echo"));
    }

    #[tokio::test]
    async fn test_timeout_isolated_from_siblings() {
        let mut registry = ToolRegistry::new();
        registry.register(Capability::from_async(
            definition("slow", &[]),
            |_| async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(ToolOutput::Text("late".to_string()))
            },
        ));
        registry.register(Capability::from_async(
            definition("fast", &[]),
            |_| async move { Ok(ToolOutput::Text("done".to_string())) },
        ));

        let batch = vec![
            request("s", "slow", json!({})),
            request("f", "fast", json!({})),
        ];
        let outcome = dispatcher(registry)
            .dispatch("main", &batch, Duration::from_secs(1))
            .await;

        assert!(outcome.results[0].is_error);
        assert!(outcome.results[0].content.contains("after 1s"));
        assert!(!outcome.results[1].is_error);
        assert_eq!(outcome.results[1].content, "done");
    }

    #[tokio::test]
    async fn test_failing_capability_still_yields_result() {
        let mut registry = ToolRegistry::new();
        registry.register(Capability::from_async(
            definition("broken", &[]),
            |_| async move {
                Err(crate::core::EnsembleError::tool("deliberate failure"))
            },
        ));
        registry.register(Capability::from_async(
            definition("fine", &[]),
            |_| async move { Ok(ToolOutput::Text("still here".to_string())) },
        ));

        let batch = vec![
            request("1", "broken", json!({})),
            request("2", "fine", json!({})),
        ];
        let outcome = dispatcher(registry)
            .dispatch("main", &batch, Duration::from_secs(5))
            .await;

        assert_eq!(outcome.results.len(), 2);
        assert!(outcome.results[0].is_error);
        assert!(outcome.results[0].content.contains("deliberate failure"));
        assert_eq!(outcome.results[1].content, "still here");
    }

    #[tokio::test]
    async fn test_handoff_surfaced_distinctly() {
        let mut registry = ToolRegistry::new();
        registry.register(transfer_capability());

        let batch = vec![request(
            "t",
            "transfer_to_agent",
            json!({"to_agent_id": "agent_b", "message": "please review"}),
        )];
        let outcome = dispatcher(registry)
            .dispatch("agent_a", &batch, Duration::from_secs(5))
            .await;

        assert_eq!(outcome.results.len(), 1);
        assert!(!outcome.results[0].is_error);
        let handoff = outcome.handoff.expect("handoff should surface");
        assert_eq!(handoff.from_agent_id, "agent_a");
        assert_eq!(handoff.to_agent_id, "agent_b");
        assert_eq!(handoff.context.len(), 1);
        assert!(handoff.context[0].content.contains("please review"));
    }

    #[tokio::test]
    async fn test_image_output_collected() {
        let mut registry = ToolRegistry::new();
        registry.register(Capability::from_async(
            definition("snap", &[]),
            |_| async move {
                Ok(ToolOutput::Image {
                    caption: Some("screenshot".to_string()),
                    base64: "aGVsbG8=".to_string(),
                })
            },
        ));

        let outcome = dispatcher(registry)
            .dispatch(
                "main",
                &[request("i", "snap", json!({}))],
                Duration::from_secs(5),
            )
            .await;

        assert_eq!(outcome.images.len(), 1);
        assert_eq!(outcome.results[0].content, "screenshot");
    }
}
