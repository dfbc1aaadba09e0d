//! Single-agent completion loop
//!
//! Drives one agent's conversation with its model: send the history, fold
//! tool invocations back in, and repeat until the model produces a plain
//! text response or the depth guard fires. Transport failures are recorded
//! as turns rather than raised, so a run degrades instead of aborting.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::agent::conversation::Conversation;
use crate::agent::policy::ContinuationPolicy;
use crate::core::{
    AgentConfig, Message, RequestDepth, Result, Role, RuntimeConfig, ToolInvocationRequest,
};
use crate::llm::{CompletionRequest, CompletionResponse, CompletionTransport};
use crate::persist::Persistence;
use crate::tools::{DispatchOutcome, ToolDispatcher, ToolRegistry};

/// One agent: a persona, a model transport, and a bounded tool loop
pub struct Agent {
    /// Agent configuration
    config: AgentConfig,
    /// Conversation history
    conversation: Conversation,
    /// Dispatcher over the shared capability registry
    dispatcher: ToolDispatcher,
    /// Provider transport selected by the model id
    transport: Arc<dyn CompletionTransport>,
    /// Consecutive tool round-trip bookkeeping
    depth: RequestDepth,
    /// Per-invocation tool timeout
    tool_timeout: Duration,
    /// Rendered directory of peer agents, maintained by the manager
    pub(crate) other_agents_info: String,
    /// Ids of the agents participating in the current context
    pub(crate) conversation_context: Vec<String>,
    /// Optional turn store
    persistence: Option<Arc<dyn Persistence>>,
}

impl Agent {
    pub fn new(
        config: AgentConfig,
        registry: Arc<ToolRegistry>,
        transport: Arc<dyn CompletionTransport>,
        runtime: &RuntimeConfig,
    ) -> Self {
        Self {
            conversation: Conversation::new(runtime.max_history),
            dispatcher: ToolDispatcher::new(registry),
            transport,
            depth: RequestDepth::with_max(runtime.max_depth),
            tool_timeout: Duration::from_secs(runtime.tool_timeout_secs),
            other_agents_info: String::new(),
            conversation_context: vec![config.id.clone()],
            persistence: None,
            config,
        }
    }

    pub fn with_persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut AgentConfig {
        &mut self.config
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Description shown to peer agents when deciding where to transfer
    pub fn description(&self) -> String {
        let mut description = self.config.description.clone();
        if self.config.tools.is_empty() {
            return description;
        }
        description.push_str(&format!(
            "Agent {} is able to use these tools: {}",
            self.config.id,
            self.config.tools.join(", ")
        ));
        description
    }

    /// Build the system turn for the next request
    ///
    /// Rebuilt every time because the peer directory can change between
    /// turns (agents registered, handoffs applied).
    pub fn system_message(&self) -> Message {
        let mut instruction = format!(
            "{} Your identity is id: {}, name: {}",
            self.config.instruction, self.config.id, self.config.name
        );
        if !self.other_agents_info.is_empty() {
            instruction.push_str(&format!(
                "\n\nYou are aware of the following other agents:\n{}",
                self.other_agents_info
            ));
        }
        Message::system(instruction).from_agent(&self.config.id)
    }

    /// Append a turn to history, offering it to the turn store if configured
    ///
    /// A plain user turn starts a fresh request, so the consecutive
    /// tool-continuation counter goes back to zero; `total_depth` keeps
    /// counting for the conversation.
    pub async fn add_message(&mut self, message: Message) {
        if let Some(ref persistence) = self.persistence {
            if let Err(e) = persistence.persist(&message).await {
                warn!(agent = %self.config.id, "skipping turn persistence: {e}");
            }
        }
        if message.role == Role::User {
            self.depth.reset_current();
        }
        self.conversation.add(message);
    }

    /// Reset the conversation participant set
    ///
    /// Used on handoff: the incoming agent's context is replaced, not
    /// merged, so stale participants never linger.
    pub fn reset_context(&mut self, participants: Vec<String>) {
        self.conversation_context = participants;
    }

    fn build_request(&self) -> CompletionRequest {
        let mut messages = vec![self.system_message()];
        messages.extend(self.conversation.get_messages());

        CompletionRequest {
            model: self.config.model.clone(),
            messages,
            tools: self
                .dispatcher
                .registry()
                .definitions_for(&self.config.tools),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        }
    }

    /// One completion round-trip, without touching history
    pub async fn step(&mut self) -> Result<CompletionResponse> {
        debug!(
            agent = %self.config.id,
            history = self.conversation.len(),
            "requesting completion"
        );
        let request = self.build_request();
        let response = self.transport.send(&request).await?;
        self.depth.advance();
        Ok(response)
    }

    /// Dispatch a batch of tool invocations requested by this agent
    pub async fn dispatch_tools(&self, batch: &[ToolInvocationRequest]) -> DispatchOutcome {
        self.dispatcher
            .dispatch(&self.config.id, batch, self.tool_timeout)
            .await
    }

    /// Run the completion loop until a plain response or suspension
    ///
    /// Returns `None` when the depth guard fires and the policy declines to
    /// continue; an approved continuation resets the consecutive counter
    /// and resumes. The total depth keeps counting across approvals.
    pub async fn run(&mut self, policy: &dyn ContinuationPolicy) -> Result<Option<CompletionResponse>> {
        loop {
            if self.depth.at_limit() {
                let question = format!(
                    "Reached {} consecutive tool round-trips. Continue?",
                    self.depth.max_depth
                );
                if !policy.ask(&question).await {
                    warn!(agent = %self.config.id, "run suspended at depth limit");
                    return Ok(None);
                }
                self.depth.reset_current();
            }

            let response = self.step().await?;

            if response.is_error() {
                let turn = response.to_message(&self.config.id);
                self.add_message(turn).await;
                return Ok(Some(response));
            }

            self.add_message(response.to_message(&self.config.id)).await;

            if !response.has_tool_calls() {
                return Ok(Some(response));
            }

            let outcome = self.dispatch_tools(&response.tool_calls).await;
            if outcome.handoff.is_some() {
                // transfers only make sense under a manager
                warn!(agent = %self.config.id, "ignoring agent transfer outside a managed run");
            }
            self.add_message(Message::tool_results(outcome.results)).await;
            for image in &outcome.images {
                self.add_message(Message::user(image_follow_up(image))).await;
            }
        }
    }
}

/// Extra user turn synthesized when a tool returns an image payload
pub(crate) fn image_follow_up(base64: &str) -> String {
    format!(
        "Please check previous query info related to this image: data:image/png;base64,{base64}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::policy::{AlwaysContinue, NeverContinue};
    use crate::core::{TransportError, ToolInvocationRequest};
    use crate::llm::CompletionTransport;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Transport that replays a fixed script of responses
    struct ScriptedTransport {
        script: Mutex<Vec<CompletionResponse>>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<CompletionResponse>) -> Self {
            Self {
                script: Mutex::new(script),
            }
        }
    }

    #[async_trait]
    impl CompletionTransport for ScriptedTransport {
        async fn send(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                return Ok(text_response(&request.model, "done"));
            }
            Ok(script.remove(0))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn text_response(model: &str, content: &str) -> CompletionResponse {
        CompletionResponse {
            model: model.to_string(),
            content: content.to_string(),
            tool_calls: Vec::new(),
            usage: None,
            error: None,
        }
    }

    fn tool_response(model: &str, name: &str) -> CompletionResponse {
        CompletionResponse {
            model: model.to_string(),
            content: String::new(),
            tool_calls: vec![ToolInvocationRequest::new("toolu_t1", name, json!({}))],
            usage: None,
            error: None,
        }
    }

    fn test_agent(script: Vec<CompletionResponse>, runtime: RuntimeConfig) -> Agent {
        let config = AgentConfig::new("main", "gpt-4o").instruction("You are helpful.");
        let registry = Arc::new(ToolRegistry::new());
        Agent::new(
            config,
            registry,
            Arc::new(ScriptedTransport::new(script)),
            &runtime,
        )
    }

    #[tokio::test]
    async fn plain_response_ends_the_loop() {
        let mut agent = test_agent(
            vec![text_response("gpt-4o", "hi")],
            RuntimeConfig::default(),
        );
        agent.add_message(Message::user("hello")).await;

        let response = agent.run(&AlwaysContinue).await.unwrap().unwrap();
        assert_eq!(response.content, "hi");
        // user turn plus assistant turn
        assert_eq!(agent.conversation().len(), 2);
    }

    #[tokio::test]
    async fn transport_error_is_recorded_and_returned() {
        let mut agent = test_agent(
            vec![CompletionResponse::from_error(
                "gpt-4o",
                TransportError::Connection("connection refused".into()),
            )],
            RuntimeConfig::default(),
        );
        agent.add_message(Message::user("hello")).await;

        let response = agent.run(&AlwaysContinue).await.unwrap().unwrap();
        assert!(response.is_error());
        let last = agent.conversation().last_assistant_message().unwrap();
        assert!(last.content.contains("could not be reached"));
    }

    #[tokio::test]
    async fn unknown_tool_is_folded_back_as_error_result() {
        let mut agent = test_agent(
            vec![
                tool_response("gpt-4o", "missing_tool"),
                text_response("gpt-4o", "recovered"),
            ],
            RuntimeConfig::default(),
        );
        agent.add_message(Message::user("go")).await;

        let response = agent.run(&AlwaysContinue).await.unwrap().unwrap();
        assert_eq!(response.content, "recovered");

        let messages = agent.conversation().get_messages();
        let tool_turn = messages
            .iter()
            .find(|m| m.tool_results.is_some())
            .expect("tool results folded into history");
        let results = tool_turn.tool_results.as_ref().unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_error);
        assert!(results[0].content.contains("not found"));
    }

    #[tokio::test]
    async fn declined_depth_limit_suspends_the_run() {
        let runtime = RuntimeConfig {
            max_depth: 2,
            ..RuntimeConfig::default()
        };
        // keeps requesting tools forever
        let script = (0..8)
            .map(|_| tool_response("gpt-4o", "missing_tool"))
            .collect();
        let mut agent = test_agent(script, runtime);
        agent.add_message(Message::user("loop")).await;

        let suspended = agent.run(&NeverContinue).await.unwrap();
        assert!(suspended.is_none());
    }

    #[tokio::test]
    async fn fresh_user_message_resets_the_depth_guard() {
        let runtime = RuntimeConfig {
            max_depth: 2,
            ..RuntimeConfig::default()
        };
        let script = (0..6).map(|i| text_response("gpt-4o", &format!("reply {i}"))).collect();
        let mut agent = test_agent(script, runtime);

        // plain exchanges make no tool continuations, so the guard must
        // never fire across consecutive requests
        for i in 0..3 {
            agent.add_message(Message::user(format!("question {i}"))).await;
            let response = agent.run(&NeverContinue).await.unwrap();
            assert!(response.is_some(), "exchange {i} should complete");
        }

        // the lifetime counter keeps going
        assert_eq!(agent.depth.total_depth, 3);
    }

    #[tokio::test]
    async fn system_message_carries_identity_and_peers() {
        let mut agent = test_agent(vec![], RuntimeConfig::default());
        agent.other_agents_info = "Agent helper: does things".to_string();

        let system = agent.system_message();
        assert!(system.content.contains("id: main"));
        assert!(system.content.contains("aware of the following other agents"));
    }
}
