use std::time::Duration;

use minion_core::{Conversation, DomainError, ReplyConfig, Turn};
use tracing::{error, info, warn};

use crate::llm::{complete_within, ChatMessage, CompletionError, CompletionRequest};
use crate::registry::AgentProfile;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InvocationOutcome {
    Completed,
    /// The backend answered with nothing usable; the turn carries the apology reply.
    EmptyCompletion,
    /// The backend failed or timed out; the turn carries the error reply.
    Failed(CompletionError),
}

impl InvocationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::EmptyCompletion => "empty_completion",
            Self::Failed(_) => "failed",
        }
    }
}

/// Reply turn produced for the pending user turn. The text is never empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub turn: Turn,
    pub outcome: InvocationOutcome,
}

/// Produces the assistant reply for a conversation's pending user turn.
#[derive(Clone, Debug)]
pub struct AgentInvoker {
    replies: ReplyConfig,
    timeout: Duration,
}

impl AgentInvoker {
    pub fn new(replies: ReplyConfig, timeout: Duration) -> Self {
        Self { replies, timeout }
    }

    pub fn replies(&self) -> &ReplyConfig {
        &self.replies
    }

    /// Persona first, then prior turns in order, then the pending user turn.
    pub fn completion_request(
        &self,
        conversation: &Conversation,
        profile: &AgentProfile,
    ) -> Result<CompletionRequest, DomainError> {
        let (history, pending) =
            conversation.pending_user_turn().ok_or(DomainError::NoPendingUserTurn)?;

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(profile.persona()));
        messages.extend(history.iter().map(ChatMessage::from));
        messages.push(ChatMessage::from(pending));
        Ok(CompletionRequest::new(messages))
    }

    pub async fn invoke(
        &self,
        conversation: &Conversation,
        profile: &AgentProfile,
    ) -> Result<Invocation, DomainError> {
        let request = self.completion_request(conversation, profile)?;
        let agent = profile.id().clone();

        let (text, outcome) =
            match complete_within(profile.completion(), &request, self.timeout).await {
                Ok(text) if !text.trim().is_empty() => {
                    info!(
                        event_name = "agent.invoke.completed",
                        agent = %agent,
                        model = profile.completion().model(),
                        history_turns = conversation.len() - 1,
                        "agent produced a reply"
                    );
                    (text.trim().to_string(), InvocationOutcome::Completed)
                }
                Ok(_) => {
                    warn!(
                        event_name = "agent.invoke.empty",
                        agent = %agent,
                        model = profile.completion().model(),
                        "agent returned an empty completion"
                    );
                    (self.replies.empty_completion.clone(), InvocationOutcome::EmptyCompletion)
                }
                Err(error) => {
                    error!(
                        event_name = "agent.invoke.failed",
                        agent = %agent,
                        model = profile.completion().model(),
                        error_kind = error.kind(),
                        error = %error,
                        "agent completion failed"
                    );
                    (self.replies.completion_error.clone(), InvocationOutcome::Failed(error))
                }
            };

        Ok(Invocation { turn: Turn::assistant(agent, text), outcome })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use minion_core::{AgentId, Conversation, DomainError, ReplyConfig, Role, Turn};

    use super::{AgentInvoker, InvocationOutcome};
    use crate::llm::testing::{Scripted, ScriptedCompletion};
    use crate::llm::{CompletionError, MessageRole};
    use crate::registry::AgentProfile;

    const APOLOGY: &str =
        "I'm sorry, I couldn't generate a response. Could you try asking something else?";
    const ERROR_REPLY: &str = "I apologize, but I encountered an error. Can we try again?";

    fn invoker() -> AgentInvoker {
        AgentInvoker::new(ReplyConfig::default(), Duration::from_secs(5))
    }

    fn cat(backend: Arc<ScriptedCompletion>) -> AgentProfile {
        AgentProfile::new(
            AgentId::new("cat"),
            "You are a friendly AI assistant who loves to talk about cats.",
            backend,
        )
    }

    fn pending(text: &str) -> Conversation {
        let mut conversation = Conversation::new();
        conversation.push_user(text).expect("user turn");
        conversation
    }

    #[tokio::test]
    async fn persona_history_and_latest_turn_are_sent_in_order() {
        let backend = Arc::new(ScriptedCompletion::replying(&["Siamese cats love to chat."]));
        let mut conversation = pending("Hi there");
        conversation
            .push_reply(Turn::assistant(AgentId::new("receptionist"), "Hello! How can I help?"))
            .expect("reply");
        conversation.push_user("Tell me about Siamese cats").expect("user turn");

        let invocation =
            invoker().invoke(&conversation, &cat(Arc::clone(&backend))).await.expect("invocation");

        let requests = backend.requests();
        let roles = requests[0].messages.iter().map(|message| message.role).collect::<Vec<_>>();
        assert_eq!(
            roles,
            vec![MessageRole::System, MessageRole::User, MessageRole::Assistant, MessageRole::User]
        );
        assert_eq!(
            requests[0].system_prompt(),
            Some("You are a friendly AI assistant who loves to talk about cats.")
        );
        assert_eq!(requests[0].messages[3].content, "Tell me about Siamese cats");

        assert_eq!(invocation.outcome, InvocationOutcome::Completed);
        assert_eq!(invocation.turn.role, Role::Assistant);
        assert_eq!(invocation.turn.agent, Some(AgentId::new("cat")));
        assert_eq!(invocation.turn.text, "Siamese cats love to chat.");
    }

    #[tokio::test]
    async fn reply_text_is_trimmed() {
        let backend = Arc::new(ScriptedCompletion::replying(&["\n  Meow.  \n"]));
        let invocation = invoker().invoke(&pending("hi"), &cat(backend)).await.expect("invocation");

        assert_eq!(invocation.turn.text, "Meow.");
    }

    #[tokio::test]
    async fn empty_completion_becomes_apology() {
        for empty in ["", "   \n\t"] {
            let backend = Arc::new(ScriptedCompletion::replying(&[empty]));
            let invocation =
                invoker().invoke(&pending("hi"), &cat(backend)).await.expect("invocation");

            assert_eq!(invocation.outcome, InvocationOutcome::EmptyCompletion);
            assert_eq!(invocation.turn.text, APOLOGY);
        }
    }

    #[tokio::test]
    async fn backend_failure_becomes_error_reply() {
        let backend = Arc::new(ScriptedCompletion::new(vec![Scripted::Fail(
            CompletionError::Transport("connection refused".to_string()),
        )]));
        let invocation = invoker().invoke(&pending("hi"), &cat(backend)).await.expect("invocation");

        assert_eq!(invocation.turn.text, ERROR_REPLY);
        assert_eq!(invocation.turn.agent, Some(AgentId::new("cat")));
        assert!(matches!(invocation.outcome, InvocationOutcome::Failed(CompletionError::Transport(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_becomes_error_reply() {
        let backend =
            Arc::new(ScriptedCompletion::new(vec![Scripted::Stall(Duration::from_secs(60))]));
        let invocation = invoker().invoke(&pending("hi"), &cat(backend)).await.expect("invocation");

        assert_eq!(invocation.turn.text, ERROR_REPLY);
        assert_eq!(
            invocation.outcome,
            InvocationOutcome::Failed(CompletionError::Timeout { after_ms: 5_000 })
        );
    }

    #[tokio::test]
    async fn configured_reply_texts_are_used() {
        let replies = ReplyConfig {
            empty_completion: "Nothing to say.".to_string(),
            completion_error: "Broken.".to_string(),
        };
        let invoker = AgentInvoker::new(replies, Duration::from_secs(5));
        let backend = Arc::new(ScriptedCompletion::new(vec![
            Scripted::Reply(String::new()),
            Scripted::Fail(CompletionError::Decode("bad json".to_string())),
        ]));
        let profile = cat(backend);

        let empty = invoker.invoke(&pending("a"), &profile).await.expect("invocation");
        let failed = invoker.invoke(&pending("b"), &profile).await.expect("invocation");

        assert_eq!(empty.turn.text, "Nothing to say.");
        assert_eq!(failed.turn.text, "Broken.");
    }

    #[tokio::test]
    async fn conversation_without_pending_turn_is_rejected() {
        let backend = Arc::new(ScriptedCompletion::replying(&["unused"]));

        let result = invoker().invoke(&Conversation::new(), &cat(Arc::clone(&backend))).await;

        assert_eq!(result.err(), Some(DomainError::NoPendingUserTurn));
        assert!(backend.requests().is_empty());
    }
}
