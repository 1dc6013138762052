use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::agent::AgentId;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    /// Agent that produced an assistant turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentId>,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, text: text.into(), agent: None, created_at: Utc::now() }
    }

    pub fn assistant(agent: AgentId, text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, text: text.into(), agent: Some(agent), created_at: Utc::now() }
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }
}

/// Ordered dialogue for one session. Turn order is replayed verbatim to the completion
/// backend, so the only mutations are appends.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn awaiting_reply(&self) -> bool {
        self.turns.last().is_some_and(Turn::is_user)
    }

    /// History preceding the pending user turn, plus that turn.
    pub fn pending_user_turn(&self) -> Option<(&[Turn], &Turn)> {
        match self.turns.split_last() {
            Some((last, history)) if last.is_user() => Some((history, last)),
            _ => None,
        }
    }

    pub fn push_user(&mut self, text: &str) -> Result<&Turn, DomainError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(DomainError::EmptyUtterance);
        }
        if self.awaiting_reply() {
            return Err(DomainError::ReplyPending);
        }

        self.turns.push(Turn::user(text));
        Ok(&self.turns[self.turns.len() - 1])
    }

    pub fn push_reply(&mut self, turn: Turn) -> Result<&Turn, DomainError> {
        if turn.role != Role::Assistant {
            return Err(DomainError::InvariantViolation(
                "replies must carry the assistant role".to_string(),
            ));
        }
        if turn.text.trim().is_empty() {
            return Err(DomainError::InvariantViolation(
                "assistant replies must not be empty".to_string(),
            ));
        }
        if !self.awaiting_reply() {
            return Err(DomainError::NoPendingUserTurn);
        }

        self.turns.push(turn);
        Ok(&self.turns[self.turns.len() - 1])
    }
}
