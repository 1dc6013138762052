//! Single-hop orchestration: one stateless classifier call picks the agent for an utterance.

use std::sync::Arc;
use std::time::Duration;

use minion_core::{normalize_label, AgentId, DomainError};
use tracing::{info, warn};

use crate::llm::{complete_within, ChatMessage, CompletionError, CompletionRequest, CompletionService};
use crate::registry::{AgentProfile, AgentRegistry};

pub const ORCHESTRATOR_ID: &str = "orchestrator";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FallbackReason {
    EmptyResponse,
    UnknownLabel(String),
    ClassifierFailed(CompletionError),
}

impl FallbackReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyResponse => "empty_response",
            Self::UnknownLabel(_) => "unknown_label",
            Self::ClassifierFailed(_) => "classifier_failed",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoutingDecision {
    Matched { agent: AgentId, label: String },
    Fallback { agent: AgentId, reason: FallbackReason },
}

impl RoutingDecision {
    pub fn agent(&self) -> &AgentId {
        match self {
            Self::Matched { agent, .. } | Self::Fallback { agent, .. } => agent,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }

    pub fn routed_by(&self) -> &'static str {
        match self {
            Self::Matched { .. } => "classifier",
            Self::Fallback { .. } => "fallback",
        }
    }
}

pub struct Router {
    registry: Arc<AgentRegistry>,
    classifier: AgentProfile,
    timeout: Duration,
}

impl Router {
    /// `preamble` opens the classification instruction; the label rules and the list of
    /// valid answers are generated from the registry.
    pub fn new(
        registry: Arc<AgentRegistry>,
        classifier: Arc<dyn CompletionService>,
        preamble: &str,
        timeout: Duration,
    ) -> Self {
        let instruction = classification_instruction(preamble, &registry);
        let classifier = AgentProfile::new(AgentId::new(ORCHESTRATOR_ID), instruction, classifier);
        Self { registry, classifier, timeout }
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn instruction(&self) -> &str {
        self.classifier.persona()
    }

    /// The utterance is the sole user message; history never reaches the classifier.
    pub fn classification_request(&self, utterance: &str) -> CompletionRequest {
        CompletionRequest::new(vec![
            ChatMessage::system(self.classifier.persona()),
            ChatMessage::user(utterance.trim()),
        ])
    }

    pub async fn route(&self, utterance: &str) -> Result<RoutingDecision, DomainError> {
        if utterance.trim().is_empty() {
            return Err(DomainError::EmptyUtterance);
        }

        let request = self.classification_request(utterance);
        let decision =
            match complete_within(self.classifier.completion(), &request, self.timeout).await {
                Ok(response) => self.decide(&response),
                Err(error) => RoutingDecision::Fallback {
                    agent: self.registry.fallback().id().clone(),
                    reason: FallbackReason::ClassifierFailed(error),
                },
            };

        match &decision {
            RoutingDecision::Matched { agent, label } => info!(
                event_name = "router.classified",
                agent = %agent,
                label = %label,
                "routing to agent"
            ),
            RoutingDecision::Fallback { agent, reason } => warn!(
                event_name = "router.fallback",
                agent = %agent,
                reason = reason.code(),
                detail = ?reason,
                "classification unusable, routing to fallback agent"
            ),
        }

        Ok(decision)
    }

    /// Maps raw classifier output onto a decision: exact match on the normalized label,
    /// fallback for anything else.
    pub fn decide(&self, response: &str) -> RoutingDecision {
        let label = normalize_label(response);
        if label.is_empty() {
            return RoutingDecision::Fallback {
                agent: self.registry.fallback().id().clone(),
                reason: FallbackReason::EmptyResponse,
            };
        }

        match self.registry.by_label(&label) {
            Some(profile) => RoutingDecision::Matched { agent: profile.id().clone(), label },
            None => RoutingDecision::Fallback {
                agent: self.registry.fallback().id().clone(),
                reason: FallbackReason::UnknownLabel(label),
            },
        }
    }

    pub fn resolve(&self, decision: &RoutingDecision) -> &Arc<AgentProfile> {
        self.registry.resolve(decision.agent())
    }
}

fn classification_instruction(preamble: &str, registry: &AgentRegistry) -> String {
    let mut lines = vec![preamble.trim().to_string()];
    let mut answers = Vec::new();

    for profile in registry.profiles() {
        let labels = profile.labels().iter().map(|label| normalize_label(label)).collect::<Vec<_>>();
        let Some(primary) = labels.first() else {
            continue;
        };
        let rule = if profile.routing_rule().trim().is_empty() {
            format!("handles queries for the {primary} agent")
        } else {
            profile.routing_rule().trim().trim_end_matches('.').to_string()
        };
        lines.push(format!("- The '{primary} agent' {rule}."));
        answers.extend(labels.into_iter().map(|label| format!("'{label}'")));
    }

    lines.push(format!(
        "Based on the user query, output only the name of the agent that should handle the \
         query: {}. Reply with the name alone.",
        answers.join(", ")
    ));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use minion_core::{AgentId, DomainError};

    use super::{FallbackReason, Router, RoutingDecision};
    use crate::llm::testing::{Scripted, ScriptedCompletion};
    use crate::llm::{CompletionError, CompletionService, MessageRole};
    use crate::registry::{AgentProfile, AgentRegistry};

    fn registry() -> Arc<AgentRegistry> {
        let backend: Arc<dyn CompletionService> = Arc::new(ScriptedCompletion::default());
        let profile = |id: &str, rule: &str| {
            AgentProfile::new(AgentId::new(id), format!("You love {id}s."), Arc::clone(&backend))
                .with_routing_rule(rule)
        };
        Arc::new(
            AgentRegistry::build(
                vec![
                    profile("cat", "handles all queries related to cats"),
                    profile("dog", "handles all queries related to dogs"),
                    profile("monkey", "handles all queries related to monkeys"),
                    profile("receptionist", "handles any general questions or unclear intent"),
                ],
                &AgentId::new("receptionist"),
            )
            .expect("registry"),
        )
    }

    fn router(classifier: Arc<ScriptedCompletion>) -> Router {
        Router::new(registry(), classifier, "You are an orchestrator assistant.", Duration::from_secs(1))
    }

    #[tokio::test]
    async fn exact_label_routes_to_matching_profile() {
        let classifier = Arc::new(ScriptedCompletion::replying(&["cat"]));
        let router = router(Arc::clone(&classifier));

        let decision = router.route("Tell me about Siamese cats").await.expect("decision");

        assert_eq!(
            decision,
            RoutingDecision::Matched { agent: AgentId::new("cat"), label: "cat".to_string() }
        );
        assert_eq!(router.resolve(&decision).persona(), "You love cats.");
    }

    #[tokio::test]
    async fn classifier_sees_only_instruction_and_utterance() {
        let classifier = Arc::new(ScriptedCompletion::replying(&["dog"]));
        let router = router(Arc::clone(&classifier));

        router.route("  Do beagles shed?  ").await.expect("decision");

        let requests = classifier.requests();
        assert_eq!(requests.len(), 1);
        let messages = &requests[0].messages;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::System);
        assert!(messages[0].content.contains("'cat', 'dog', 'monkey', 'receptionist'"));
        assert!(messages[0].content.contains("- The 'monkey agent' handles all queries related to monkeys."));
        assert_eq!(messages[1].role, MessageRole::User);
        assert_eq!(messages[1].content, "Do beagles shed?");
    }

    #[tokio::test]
    async fn response_is_trimmed_and_lowercased_before_matching() {
        let classifier = Arc::new(ScriptedCompletion::replying(&["  Monkey\n"]));
        let decision = router(classifier).route("bananas?").await.expect("decision");

        assert_eq!(decision.agent(), &AgentId::new("monkey"));
        assert!(!decision.is_fallback());
    }

    #[tokio::test]
    async fn empty_classification_falls_back() {
        let classifier = Arc::new(ScriptedCompletion::replying(&[""]));
        let decision = router(classifier).route("asdkjasd").await.expect("decision");

        assert_eq!(
            decision,
            RoutingDecision::Fallback {
                agent: AgentId::new("receptionist"),
                reason: FallbackReason::EmptyResponse,
            }
        );
    }

    #[test]
    fn ambiguous_classifications_fall_back() {
        let router = router(Arc::new(ScriptedCompletion::default()));

        for response in ["   ", "cat or dog", "The cat agent.", "parrot", "'cat'"] {
            let decision = router.decide(response);
            assert!(decision.is_fallback(), "`{response}` should fall back");
            assert_eq!(decision.agent(), &AgentId::new("receptionist"));
        }
    }

    #[test]
    fn every_registered_label_matches_itself() {
        let router = router(Arc::new(ScriptedCompletion::default()));

        for label in ["cat", "dog", "monkey", "receptionist"] {
            assert_eq!(router.decide(label).agent(), &AgentId::new(label));
            assert_eq!(router.decide(&label.to_uppercase()).agent(), &AgentId::new(label));
        }
    }

    #[tokio::test]
    async fn classifier_failure_degrades_to_fallback() {
        let classifier = Arc::new(ScriptedCompletion::new(vec![Scripted::Fail(
            CompletionError::Http { status: 503, body: "overloaded".to_string() },
        )]));
        let decision = router(classifier).route("Tell me about cats").await.expect("decision");

        assert!(matches!(
            decision,
            RoutingDecision::Fallback { reason: FallbackReason::ClassifierFailed(_), .. }
        ));
        assert_eq!(decision.routed_by(), "fallback");
    }

    #[tokio::test(start_paused = true)]
    async fn classifier_timeout_degrades_to_fallback() {
        let classifier =
            Arc::new(ScriptedCompletion::new(vec![Scripted::Stall(Duration::from_secs(30))]));
        let decision = router(classifier).route("Tell me about cats").await.expect("decision");

        assert_eq!(
            decision,
            RoutingDecision::Fallback {
                agent: AgentId::new("receptionist"),
                reason: FallbackReason::ClassifierFailed(CompletionError::Timeout {
                    after_ms: 1_000
                }),
            }
        );
    }

    #[tokio::test]
    async fn empty_utterance_is_not_routed() {
        let classifier = Arc::new(ScriptedCompletion::replying(&["cat"]));
        let router = router(Arc::clone(&classifier));

        assert_eq!(router.route(" \t").await, Err(DomainError::EmptyUtterance));
        assert!(classifier.requests().is_empty());
    }
}
