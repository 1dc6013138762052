use std::sync::Arc;
use std::time::Duration;

use minion_core::{AgentId, AppConfig, ApplicationError, ConfigurationError, SessionId, Turn};
use thiserror::Error;
use tracing::{error, info};

use crate::invoker::{AgentInvoker, InvocationOutcome};
use crate::llm::CompletionError;
use crate::providers::CompletionPool;
use crate::registry::{AgentProfile, AgentRegistry};
use crate::router::{Router, RoutingDecision};
use crate::session::{SessionGuard, SessionStore};

#[derive(Debug, Error)]
pub enum RuntimeBuildError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("failed to construct completion client: {0}")]
    Completion(#[from] CompletionError),
}

/// Result of one handled utterance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub session_id: SessionId,
    pub text: String,
    pub agent: AgentId,
    pub decision: RoutingDecision,
    pub outcome: InvocationOutcome,
    /// Conversation length after the reply was appended.
    pub turn_count: usize,
}

impl Reply {
    pub fn routed_by(&self) -> &'static str {
        self.decision.routed_by()
    }
}

/// Session entry point: append the user turn, route, invoke, append the reply.
pub struct AgentRuntime {
    router: Router,
    invoker: AgentInvoker,
    sessions: SessionStore,
}

impl AgentRuntime {
    pub fn new(router: Router, invoker: AgentInvoker) -> Self {
        Self { router, invoker, sessions: SessionStore::new() }
    }

    /// Wires the agent roster, classifier, and reply texts from configuration. Profiles
    /// with identical model settings share one completion client.
    pub fn from_config(config: &AppConfig) -> Result<Self, RuntimeBuildError> {
        let mut pool = CompletionPool::new(&config.llm);

        let mut profiles = Vec::with_capacity(config.agents.len());
        for agent in &config.agents {
            let completion = pool.handle(agent.model.as_deref(), agent.temperature)?;
            profiles.push(
                AgentProfile::new(AgentId::new(agent.id.trim()), agent.persona.clone(), completion)
                    .with_labels(agent.effective_labels())
                    .with_routing_rule(agent.routing_rule.clone()),
            );
        }

        let registry =
            Arc::new(AgentRegistry::build(profiles, &AgentId::new(config.routing.fallback.trim()))?);
        let classifier = pool.handle(config.routing.model.as_deref(), None)?;
        let timeout = Duration::from_secs(config.llm.timeout_secs);

        info!(
            event_name = "system.registry_built",
            agents = registry.len(),
            fallback = %registry.fallback().id(),
            completion_clients = pool.len(),
            provider = config.llm.provider.as_str(),
            "agent registry ready"
        );

        let router = Router::new(registry, classifier, &config.routing.instruction, timeout);
        Ok(Self::new(router, AgentInvoker::new(config.replies.clone(), timeout)))
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        self.router.registry()
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Only rejected input fails this call; routing and completion problems come back as
    /// a fallback agent or a fixed reply text.
    ///
    /// The pipeline runs on its own task so a caller that goes away mid-request cannot
    /// strand a user turn without its reply. If the pipeline itself dies, the user turn is
    /// answered with the configured error reply before the session lock is released.
    pub async fn handle_utterance(
        self: &Arc<Self>,
        session_id: &SessionId,
        text: &str,
    ) -> Result<Reply, ApplicationError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ApplicationError::InvalidInput(
                "utterance text must not be empty".to_string(),
            ));
        }

        let runtime = Arc::clone(self);
        let session_id = session_id.clone();
        let text = text.to_string();
        tokio::spawn(async move { runtime.process(session_id, text).await })
            .await
            .map_err(|error| ApplicationError::Integration(format!("utterance task aborted: {error}")))?
    }

    async fn process(&self, session_id: SessionId, text: String) -> Result<Reply, ApplicationError> {
        let mut scope = UtteranceScope {
            state: self.sessions.checkout(&session_id).await,
            session_id: session_id.clone(),
            recovery: None,
        };
        scope.state.append_user(&text)?;
        scope.recovery = Some((
            self.registry().fallback().id().clone(),
            self.invoker.replies().completion_error.clone(),
        ));

        let decision = self.router.route(&text).await?;
        let profile = Arc::clone(self.router.resolve(&decision));
        let invocation = self.invoker.invoke(scope.state.current(), &profile).await?;

        let reply_text = invocation.turn.text.clone();
        let turn_count = scope.state.append_reply(invocation.turn)?.len();
        drop(scope);

        info!(
            event_name = "session.interaction",
            session_id = %session_id,
            agent = %profile.id(),
            routed_by = decision.routed_by(),
            outcome = invocation.outcome.as_str(),
            user_text = %text,
            reply = %reply_text,
            turn_count,
            "utterance handled"
        );

        Ok(Reply {
            session_id,
            text: reply_text,
            agent: profile.id().clone(),
            decision,
            outcome: invocation.outcome,
            turn_count,
        })
    }
}

/// Session lock held for one utterance. Once the user turn is in, dropping the scope
/// without a reply (early return, panic, task abort) appends the error reply so the
/// conversation never ends on an unanswered user turn.
struct UtteranceScope {
    state: SessionGuard,
    session_id: SessionId,
    recovery: Option<(AgentId, String)>,
}

impl Drop for UtteranceScope {
    fn drop(&mut self) {
        let Some((agent, text)) = self.recovery.take() else {
            return;
        };
        if !self.state.current().awaiting_reply() {
            return;
        }

        match self.state.append_reply(Turn::assistant(agent, text)).map(|turns| turns.len()) {
            Ok(turn_count) => error!(
                event_name = "session.recovered",
                session_id = %self.session_id,
                turn_count,
                "utterance aborted before its reply; answered with the error reply"
            ),
            Err(failure) => error!(
                event_name = "session.recovery_failed",
                session_id = %self.session_id,
                error = %failure,
                "could not answer the aborted utterance"
            ),
        }
    }
}
