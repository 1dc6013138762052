//! Session-keyed conversation storage.
//!
//! Each session owns its own `Conversation` behind a `tokio::sync::Mutex`. A caller that
//! checks a session out holds that lock until the guard drops, so the user turn and the
//! reply for one utterance land together and concurrent utterances on the same session
//! queue up behind each other. Distinct sessions never contend beyond the brief map lookup.
//!
//! Reset and idle eviction drop the map entry. A slot that leaves the map is marked retired
//! while its lock is held, and checkouts that were already queued on it start over.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use minion_core::{Conversation, DomainError, SessionId, Turn};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::time::Instant;
use tracing::{debug, info};

#[derive(Debug)]
pub struct SessionState {
    conversation: Conversation,
    last_active: Instant,
    retired: bool,
}

impl SessionState {
    fn new() -> Self {
        Self { conversation: Conversation::new(), last_active: Instant::now(), retired: false }
    }

    pub fn append_user(&mut self, text: &str) -> Result<&Conversation, DomainError> {
        self.conversation.push_user(text)?;
        self.last_active = Instant::now();
        Ok(&self.conversation)
    }

    pub fn append_reply(&mut self, turn: Turn) -> Result<&Conversation, DomainError> {
        self.conversation.push_reply(turn)?;
        self.last_active = Instant::now();
        Ok(&self.conversation)
    }

    pub fn current(&self) -> &Conversation {
        &self.conversation
    }

    fn idle_for(&self) -> Duration {
        self.last_active.elapsed()
    }
}

pub type SessionGuard = OwnedMutexGuard<SessionState>;

#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<SessionState>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the session for exclusive use, creating it on first contact.
    pub async fn checkout(&self, session_id: &SessionId) -> SessionGuard {
        loop {
            let slot = self.slot(session_id).await;
            debug!(event_name = "session.checkout", session_id = %session_id, "waiting for session lock");
            let state = slot.lock_owned().await;
            if !state.retired {
                return state;
            }
        }
    }

    async fn slot(&self, session_id: &SessionId) -> Arc<Mutex<SessionState>> {
        if let Some(slot) = self.sessions.read().await.get(session_id) {
            return Arc::clone(slot);
        }

        let mut sessions = self.sessions.write().await;
        Arc::clone(sessions.entry(session_id.clone()).or_insert_with(|| {
            info!(event_name = "session.created", session_id = %session_id, "session created");
            Arc::new(Mutex::new(SessionState::new()))
        }))
    }

    /// Copy of the session's conversation, waiting for any in-flight utterance to finish.
    pub async fn snapshot(&self, session_id: &SessionId) -> Option<Conversation> {
        let slot = self.sessions.read().await.get(session_id).cloned()?;
        let state = slot.lock().await;
        (!state.retired).then(|| state.current().clone())
    }

    /// Waits for any in-flight utterance, then forgets the session. The next utterance
    /// under the same id starts an empty conversation. Returns whether the session existed.
    pub async fn reset(&self, session_id: &SessionId) -> bool {
        let Some(slot) = self.sessions.read().await.get(session_id).cloned() else {
            return false;
        };

        let mut state = slot.lock().await;
        if state.retired {
            return false;
        }
        {
            let mut sessions = self.sessions.write().await;
            if sessions.get(session_id).is_some_and(|current| Arc::ptr_eq(current, &slot)) {
                sessions.remove(session_id);
            }
        }
        state.retired = true;

        info!(
            event_name = "session.reset",
            session_id = %session_id,
            discarded_turns = state.current().len(),
            "session discarded"
        );
        true
    }

    /// Drops every session whose last turn is at least `max_idle` old. Sessions with an
    /// utterance in flight are skipped. Returns how many were evicted.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();

        sessions.retain(|_, slot| match slot.try_lock() {
            Ok(mut state) if state.idle_for() >= max_idle => {
                state.retired = true;
                false
            }
            _ => true,
        });

        let evicted = before - sessions.len();
        if evicted > 0 {
            info!(
                event_name = "session.evicted",
                evicted,
                remaining = sessions.len(),
                idle_secs = max_idle.as_secs(),
                "idle sessions evicted"
            );
        }
        evicted
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
