//! Multi-agent orchestrator
//!
//! Owns the agent registry, tracks the active and primary agents, and drives
//! the outer run loop: one completion per turn, tool dispatch, handoff
//! application, and turn-budget enforcement.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::agent::agent::{image_follow_up, Agent};
use crate::agent::policy::{AlwaysContinue, ContinuationPolicy};
use crate::core::{
    AgentConfig, Config, EnsembleError, HandoffResult, Message, Result, RunMetadata,
};
use crate::llm::{create_transport, CompletionResponse, CompletionTransport};
use crate::persist::Persistence;
use crate::tools::{register_builtins, transfer_capability, ToolRegistry, TRANSFER_TOOL};

/// Coordinates a set of agents sharing one capability registry
pub struct AgentManager {
    config: Config,
    agents: HashMap<String, Agent>,
    active_agent_id: Option<String>,
    primary_agent_id: Option<String>,
    registry: Arc<ToolRegistry>,
    policy: Arc<dyn ContinuationPolicy>,
    persistence: Option<Arc<dyn Persistence>>,
}

impl AgentManager {
    /// Create a manager with the built-in capabilities registered
    pub fn new(config: Config) -> Self {
        let mut registry = ToolRegistry::new();
        register_builtins(&mut registry);
        registry.register(transfer_capability());

        Self::with_registry(config, registry)
    }

    /// Create a manager over a caller-supplied registry
    pub fn with_registry(config: Config, registry: ToolRegistry) -> Self {
        info!("agent manager initialized");
        Self {
            config,
            agents: HashMap::new(),
            active_agent_id: None,
            primary_agent_id: None,
            registry: Arc::new(registry),
            policy: Arc::new(AlwaysContinue),
            persistence: None,
        }
    }

    /// Replace the continuation policy
    pub fn set_policy(&mut self, policy: Arc<dyn ContinuationPolicy>) {
        self.policy = policy;
    }

    /// Attach a turn store shared by agents registered afterwards
    pub fn set_persistence(&mut self, persistence: Arc<dyn Persistence>) {
        self.persistence = Some(persistence);
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Register an agent, selecting a transport from its model id
    pub fn register_agent(&mut self, config: AgentConfig) -> Result<&Agent> {
        let transport = create_transport(&self.config, &config.model)?;
        self.register_agent_with_transport(config, transport)
    }

    /// Register an agent with an explicit transport
    ///
    /// Registering an id twice returns the existing agent untouched.
    pub fn register_agent_with_transport(
        &mut self,
        config: AgentConfig,
        transport: Arc<dyn CompletionTransport>,
    ) -> Result<&Agent> {
        if self.agents.contains_key(&config.id) {
            warn!(agent = %config.id, "agent already exists, returning existing agent");
            return Ok(&self.agents[&config.id]);
        }

        if config.is_primary {
            if let Some(ref existing) = self.primary_agent_id {
                return Err(EnsembleError::config(format!(
                    "agent '{}' cannot be primary, '{}' already is",
                    config.id, existing
                )));
            }
            self.primary_agent_id = Some(config.id.clone());
        }

        let id = config.id.clone();
        let mut agent = Agent::new(
            config,
            Arc::clone(&self.registry),
            transport,
            &self.config.runtime,
        );
        if let Some(ref persistence) = self.persistence {
            agent = agent.with_persistence(Arc::clone(persistence));
        }
        self.agents.insert(id.clone(), agent);
        info!(
            agent = %id,
            available = ?self.agents.keys().collect::<Vec<_>>(),
            "registered agent"
        );
        self.update_other_agents_info();
        Ok(&self.agents[&id])
    }

    pub fn get_agent(&self, id: &str) -> Result<&Agent> {
        self.agents
            .get(id)
            .ok_or_else(|| EnsembleError::AgentNotFound(id.to_string()))
    }

    fn get_agent_mut(&mut self, id: &str) -> Result<&mut Agent> {
        self.agents
            .get_mut(id)
            .ok_or_else(|| EnsembleError::AgentNotFound(id.to_string()))
    }

    /// Directory of registered agents as `(id, description)` pairs
    pub fn list_agents(&self, exclude: &[&str]) -> Vec<(String, String)> {
        let mut listing: Vec<(String, String)> = self
            .agents
            .values()
            .filter(|agent| !exclude.contains(&agent.id()))
            .map(|agent| (agent.id().to_string(), agent.description()))
            .collect();
        listing.sort();
        listing
    }

    /// Grant an agent access to a registered capability
    pub fn add_tool_to_agent(&mut self, agent_id: &str, tool_name: &str) -> Result<()> {
        if self.registry.resolve(tool_name).is_none() {
            return Err(EnsembleError::tool(format!(
                "capability '{tool_name}' is not registered"
            )));
        }
        let agent = self.get_agent_mut(agent_id)?;
        let tools = &mut agent.config_mut().tools;
        if !tools.iter().any(|t| t == tool_name) {
            tools.push(tool_name.to_string());
        }
        debug!(agent = %agent_id, tool = %tool_name, "granted capability");
        Ok(())
    }

    /// Refresh every agent's rendered view of its peers
    ///
    /// The primary agent sees the full directory; every other agent sees
    /// only the primary. With more than one agent registered, everyone also
    /// gets the transfer capability.
    pub fn update_other_agents_info(&mut self) {
        if self.primary_agent_id.is_none() {
            self.primary_agent_id = self
                .agents
                .values()
                .find(|a| a.config().is_primary)
                .map(|a| a.id().to_string());
        }

        let primary_info = self.primary_agent_id.as_ref().and_then(|id| {
            self.agents
                .get(id)
                .map(|agent| format!("id: {}, description: {}", agent.id(), agent.description()))
        });
        let multi_agent = self.agents.len() > 1;

        let ids: Vec<String> = self.agents.keys().cloned().collect();
        for id in ids {
            let info = if Some(&id) == self.primary_agent_id.as_ref() {
                self.list_agents(&[id.as_str()])
                    .into_iter()
                    .map(|(peer, description)| format!("id: {peer}, description: {description}"))
                    .collect::<Vec<_>>()
                    .join("\n")
            } else {
                primary_info.clone().unwrap_or_default()
            };

            if let Some(agent) = self.agents.get_mut(&id) {
                agent.other_agents_info = info;
                let tools = &mut agent.config_mut().tools;
                if multi_agent && !tools.iter().any(|t| t == TRANSFER_TOOL) {
                    tools.push(TRANSFER_TOOL.to_string());
                }
            }
        }
    }

    /// Run a conversation turn loop starting from the given agent
    ///
    /// The entry agent becomes the primary for this run. Control returns
    /// when the primary produces a plain text response, or when the turn
    /// budget stops the loop.
    pub async fn run(
        &mut self,
        agent_id: &str,
        message: &str,
        metadata: &mut RunMetadata,
    ) -> Result<CompletionResponse> {
        self.get_agent(agent_id)?;
        self.primary_agent_id = Some(agent_id.to_string());
        self.active_agent_id = Some(agent_id.to_string());
        self.update_other_agents_info();
        metadata.record_user_message(message);

        info!(run = %metadata.run_id, agent = %agent_id, "starting run");

        let user_turn = Message::user(message);
        self.get_agent_mut(agent_id)?.add_message(user_turn).await;

        let mut last_response: Option<CompletionResponse> = None;
        loop {
            metadata.current_turn += 1;
            if !self.should_continue(metadata).await {
                return last_response.ok_or_else(|| {
                    EnsembleError::other("turn budget exhausted before any completion")
                });
            }

            let active_id = self
                .active_agent_id
                .clone()
                .ok_or_else(|| EnsembleError::other("no active agent"))?;

            let response = self.get_agent_mut(&active_id)?.step().await?;

            if response.is_error() {
                error!(agent = %active_id, "completion failed: {}", response.text());
                // keep the failed exchange in history so the model does not
                // immediately retry the same request
                let turn = response.to_message(&active_id);
                self.get_agent_mut(&active_id)?.add_message(turn).await;
                last_response = Some(response);
                continue;
            }

            let turn = response.to_message(&active_id);
            self.get_agent_mut(&active_id)?.add_message(turn).await;

            if !response.has_tool_calls() {
                if Some(&active_id) == self.primary_agent_id.as_ref() {
                    info!(run = %metadata.run_id, turns = metadata.current_turn, "run completed");
                    return Ok(response);
                }
                // a finished non-primary agent hands control back
                let primary = self
                    .primary_agent_id
                    .clone()
                    .ok_or_else(|| EnsembleError::other("no primary agent"))?;
                let handoff = HandoffResult {
                    from_agent_id: active_id.clone(),
                    to_agent_id: primary,
                    context: vec![Message::user(response.text()).from_agent(&active_id)],
                };
                self.apply_handoff(handoff).await?;
                last_response = Some(response);
                continue;
            }

            let outcome = {
                let agent = self.get_agent(&active_id)?;
                agent.dispatch_tools(&response.tool_calls).await
            };

            self.get_agent_mut(&active_id)?
                .add_message(Message::tool_results(outcome.results))
                .await;

            if let Some(handoff) = outcome.handoff {
                if self.agents.contains_key(&handoff.to_agent_id) {
                    self.apply_handoff(handoff).await?;
                } else {
                    // recover conversationally instead of aborting the run
                    warn!(target = %handoff.to_agent_id, "transfer to unknown agent");
                    let notice = Message::user(format!(
                        "Transfer failed: no agent with id '{}' is registered.",
                        handoff.to_agent_id
                    ));
                    self.get_agent_mut(&active_id)?.add_message(notice).await;
                }
                last_response = Some(response);
                continue;
            }

            if let Some(image) = outcome.images.first() {
                let follow_up = Message::user(image_follow_up(image));
                self.get_agent_mut(&active_id)?.add_message(follow_up).await;
            }
            last_response = Some(response);
        }
    }

    /// Turn-budget gate evaluated at the top of every loop iteration
    async fn should_continue(&mut self, metadata: &mut RunMetadata) -> bool {
        if metadata.enable_turn_debug {
            let question = format!(
                "Maximum turn {}, current: {}. Debug. Continue?",
                metadata.max_turns, metadata.current_turn
            );
            if !self.policy.ask(&question).await {
                warn!("run stopped by policy");
                return false;
            }
        }
        if metadata.current_turn > metadata.max_turns {
            let is_test = self
                .active_agent_id
                .as_ref()
                .and_then(|id| self.agents.get(id))
                .map(|agent| agent.config().is_test)
                .unwrap_or(false);
            if is_test {
                return false;
            }
            warn!(max_turns = metadata.max_turns, "run reached turn budget");
            metadata.max_turns += 10;
            let question = format!(
                "Increase maximum turn to {}, continue?",
                metadata.max_turns
            );
            if !self.policy.ask(&question).await {
                warn!("run stopped by policy");
                return false;
            }
        }
        true
    }

    /// Apply a handoff between loop iterations
    ///
    /// The incoming agent's participant set is replaced, never merged, and
    /// the carried context turns are appended in order.
    pub async fn apply_handoff(&mut self, handoff: HandoffResult) -> Result<()> {
        let agent = self.get_agent_mut(&handoff.to_agent_id)?;
        agent.reset_context(vec![
            handoff.from_agent_id.clone(),
            handoff.to_agent_id.clone(),
        ]);
        for turn in handoff.context {
            agent.add_message(turn).await;
        }
        info!(
            from = %handoff.from_agent_id,
            to = %handoff.to_agent_id,
            "applied agent handoff"
        );
        self.active_agent_id = Some(handoff.to_agent_id);
        Ok(())
    }

    pub fn active_agent_id(&self) -> Option<&str> {
        self.active_agent_id.as_deref()
    }

    pub fn primary_agent_id(&self) -> Option<&str> {
        self.primary_agent_id.as_deref()
    }

    /// Disconnect collaborators and drop every agent
    pub async fn clean_up(&mut self) {
        if let Some(ref persistence) = self.persistence {
            if let Err(e) = persistence.disconnect().await {
                error!("error disconnecting persistence: {e}");
            }
        }
        self.agents.clear();
        self.active_agent_id = None;
        self.primary_agent_id = None;
        info!("all agents cleaned up and removed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::CompletionRequest;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Transport that always answers with fixed text
    struct EchoTransport;

    #[async_trait]
    impl CompletionTransport for EchoTransport {
        async fn send(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
            Ok(CompletionResponse {
                model: request.model.clone(),
                content: "ok".to_string(),
                tool_calls: Vec::new(),
                usage: None,
                error: None,
            })
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    fn register(manager: &mut AgentManager, config: AgentConfig) -> Result<String> {
        let agent = manager.register_agent_with_transport(config, Arc::new(EchoTransport))?;
        Ok(agent.id().to_string())
    }

    /// Policy that records every question and replays scripted answers
    struct RecordingPolicy {
        answers: Mutex<Vec<bool>>,
        questions: Mutex<Vec<String>>,
    }

    impl RecordingPolicy {
        fn new(answers: Vec<bool>) -> Arc<Self> {
            Arc::new(Self {
                answers: Mutex::new(answers),
                questions: Mutex::new(Vec::new()),
            })
        }

        fn questions(&self) -> Vec<String> {
            self.questions.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ContinuationPolicy for RecordingPolicy {
        async fn ask(&self, question: &str) -> bool {
            self.questions.lock().unwrap().push(question.to_string());
            let mut answers = self.answers.lock().unwrap();
            if answers.is_empty() {
                false
            } else {
                answers.remove(0)
            }
        }
    }

    #[tokio::test]
    async fn turn_debug_asks_the_policy_every_turn() {
        let mut manager = AgentManager::new(Config::default());
        let policy = RecordingPolicy::new(vec![true, false]);
        manager.set_policy(policy.clone());

        let mut metadata = RunMetadata::default();
        metadata.enable_turn_debug = true;

        metadata.current_turn = 1;
        assert!(manager.should_continue(&mut metadata).await);
        metadata.current_turn = 2;
        assert!(!manager.should_continue(&mut metadata).await);

        let questions = policy.questions();
        assert_eq!(questions.len(), 2);
        assert!(questions.iter().all(|q| q.contains("Debug")));
    }

    #[tokio::test]
    async fn approved_budget_overrun_extends_max_turns() {
        let mut manager = AgentManager::new(Config::default());
        register(&mut manager, AgentConfig::new("a", "gpt-4o")).unwrap();
        manager.active_agent_id = Some("a".to_string());
        let policy = RecordingPolicy::new(vec![true]);
        manager.set_policy(policy.clone());

        let mut metadata = RunMetadata::new(1);
        metadata.current_turn = 2;

        assert!(manager.should_continue(&mut metadata).await);
        assert_eq!(metadata.max_turns, 11);
        assert!(policy.questions()[0].contains("Increase maximum turn to 11"));
    }

    #[tokio::test]
    async fn declined_budget_overrun_stops_a_non_test_agent() {
        let mut manager = AgentManager::new(Config::default());
        register(&mut manager, AgentConfig::new("a", "gpt-4o")).unwrap();
        manager.active_agent_id = Some("a".to_string());
        let policy = RecordingPolicy::new(vec![false]);
        manager.set_policy(policy.clone());

        let mut metadata = RunMetadata::new(1);
        metadata.current_turn = 2;

        assert!(!manager.should_continue(&mut metadata).await);
        // the policy was consulted, unlike the silent is_test stop
        assert_eq!(policy.questions().len(), 1);
    }

    #[test]
    fn duplicate_registration_returns_existing_agent() {
        let mut manager = AgentManager::new(Config::default());
        let config = AgentConfig::new("a", "gpt-4o");
        register(&mut manager, config.clone()).unwrap();
        let again = register(&mut manager, config).unwrap();
        assert_eq!(again, "a");
        assert_eq!(manager.list_agents(&[]).len(), 1);
    }

    #[test]
    fn second_primary_is_rejected() {
        let mut manager = AgentManager::new(Config::default());
        register(&mut manager, AgentConfig::new("a", "gpt-4o").primary()).unwrap();
        let err = register(&mut manager, AgentConfig::new("b", "gpt-4o").primary()).unwrap_err();
        assert!(err.to_string().contains("already is"));
    }

    #[test]
    fn peers_gain_transfer_tool_once_multi_agent() {
        let mut manager = AgentManager::new(Config::default());
        register(&mut manager, AgentConfig::new("a", "gpt-4o").primary()).unwrap();
        register(&mut manager, AgentConfig::new("b", "claude-3-5-sonnet")).unwrap();

        for id in ["a", "b"] {
            let agent = manager.get_agent(id).unwrap();
            assert!(
                agent.config().tools.iter().any(|t| t == TRANSFER_TOOL),
                "agent {id} should carry the transfer capability"
            );
        }

        // the non-primary agent sees only the primary
        let b = manager.get_agent("b").unwrap();
        assert!(b.other_agents_info.contains("id: a"));
        assert!(!b.other_agents_info.contains("id: b"));
    }

    #[tokio::test]
    async fn handoff_hard_resets_participant_set() {
        let mut manager = AgentManager::new(Config::default());
        register(&mut manager, AgentConfig::new("a", "gpt-4o").primary()).unwrap();
        register(&mut manager, AgentConfig::new("b", "gpt-4o")).unwrap();

        // seed a stale participant set on the target
        manager
            .get_agent_mut("b")
            .unwrap()
            .reset_context(vec!["x".into(), "y".into(), "b".into()]);

        manager
            .apply_handoff(HandoffResult {
                from_agent_id: "a".into(),
                to_agent_id: "b".into(),
                context: vec![Message::user("take over").from_agent("a")],
            })
            .await
            .unwrap();

        assert_eq!(manager.active_agent_id(), Some("b"));
        let b = manager.get_agent("b").unwrap();
        assert_eq!(b.conversation_context, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(b.conversation().get_messages()[0].content, "take over");
    }

    #[test]
    fn unknown_capability_grant_is_rejected() {
        let mut manager = AgentManager::new(Config::default());
        register(&mut manager, AgentConfig::new("a", "gpt-4o")).unwrap();
        assert!(manager.add_tool_to_agent("a", "no_such_tool").is_err());
        assert!(manager.add_tool_to_agent("a", "shell").is_ok());
    }
}
