use std::time::Duration;

use async_trait::async_trait;
use minion_core::{Role, Turn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: MessageRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: MessageRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: MessageRole::Assistant, content: content.into() }
    }
}

impl From<&Turn> for ChatMessage {
    fn from(turn: &Turn) -> Self {
        match turn.role {
            Role::User => Self::user(turn.text.clone()),
            Role::Assistant => Self::assistant(turn.text.clone()),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self { messages }
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|message| message.role == MessageRole::System)
            .map(|message| message.content.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompletionError {
    #[error("completion transport failed: {0}")]
    Transport(String),
    #[error("completion endpoint returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("completion response could not be decoded: {0}")]
    Decode(String),
    #[error("completion timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },
}

impl CompletionError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Http { .. } => "http",
            Self::Decode(_) => "decode",
            Self::Timeout { .. } => "timeout",
        }
    }
}

/// Text completion backend: role-tagged messages in, generated text out.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;

    /// Model identifier used in logs.
    fn model(&self) -> &str {
        "unknown"
    }
}

/// Runs one completion call bounded by `limit`; elapsing counts as a failure.
pub async fn complete_within(
    service: &dyn CompletionService,
    request: &CompletionRequest,
    limit: Duration,
) -> Result<String, CompletionError> {
    match tokio::time::timeout(limit, service.complete(request)).await {
        Ok(result) => result,
        Err(_) => Err(CompletionError::Timeout {
            after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::{CompletionError, CompletionRequest, CompletionService};

    #[derive(Clone, Debug)]
    pub enum Scripted {
        Reply(String),
        Fail(CompletionError),
        Stall(Duration),
        Panic,
    }

    /// Replays scripted outcomes in order and records every request it receives.
    #[derive(Default)]
    pub struct ScriptedCompletion {
        script: Mutex<VecDeque<Scripted>>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedCompletion {
        pub fn new(script: Vec<Scripted>) -> Self {
            Self { script: Mutex::new(script.into()), requests: Mutex::new(Vec::new()) }
        }

        pub fn replying(texts: &[&str]) -> Self {
            Self::new(texts.iter().map(|text| Scripted::Reply((*text).to_string())).collect())
        }

        pub fn requests(&self) -> Vec<CompletionRequest> {
            self.requests.lock().expect("requests lock").clone()
        }
    }

    #[async_trait]
    impl CompletionService for ScriptedCompletion {
        async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
            self.requests.lock().expect("requests lock").push(request.clone());
            let next = self.script.lock().expect("script lock").pop_front();
            match next {
                Some(Scripted::Reply(text)) => Ok(text),
                Some(Scripted::Fail(error)) => Err(error),
                Some(Scripted::Stall(duration)) => {
                    tokio::time::sleep(duration).await;
                    Ok("too late".to_string())
                }
                Some(Scripted::Panic) => panic!("scripted completion panicked"),
                None => Err(CompletionError::Transport("script exhausted".to_string())),
            }
        }

        fn model(&self) -> &str {
            "scripted"
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use minion_core::{AgentId, Turn};

    use super::testing::{Scripted, ScriptedCompletion};
    use super::{complete_within, ChatMessage, CompletionError, CompletionRequest, MessageRole};

    #[test]
    fn turns_map_onto_service_roles() {
        let user = ChatMessage::from(&Turn::user("hello"));
        let assistant = ChatMessage::from(&Turn::assistant(AgentId::new("cat"), "meow"));

        assert_eq!(user.role, MessageRole::User);
        assert_eq!(assistant.role, MessageRole::Assistant);
        assert_eq!(assistant.content, "meow");
    }

    #[test]
    fn roles_serialize_in_wire_vocabulary() {
        let encoded = serde_json::to_string(&ChatMessage::system("persona")).expect("encode");
        assert_eq!(encoded, r#"{"role":"system","content":"persona"}"#);
    }

    #[tokio::test]
    async fn complete_within_passes_through_results() {
        let service = ScriptedCompletion::replying(&["ok"]);
        let request = CompletionRequest::new(vec![ChatMessage::user("hi")]);

        let result = complete_within(&service, &request, Duration::from_secs(1)).await;
        assert_eq!(result, Ok("ok".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn complete_within_converts_elapsed_calls_into_timeouts() {
        let service = ScriptedCompletion::new(vec![Scripted::Stall(Duration::from_secs(60))]);
        let request = CompletionRequest::new(vec![ChatMessage::user("hi")]);

        let result = complete_within(&service, &request, Duration::from_millis(250)).await;
        assert_eq!(result, Err(CompletionError::Timeout { after_ms: 250 }));
    }
}
