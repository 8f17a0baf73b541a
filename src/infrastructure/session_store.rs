//! In-process session storage

use crate::core::conversation::{Conversation, SessionHandle};
use crate::infrastructure::traits::{SessionStore, SharedConversation};
use async_trait::async_trait;
use di::{inject, injectable};
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

struct SessionEntry {
    conversation: SharedConversation,
    last_seen: Instant,
}

/// Maps session handles to conversations. The map lock is only held for lookups; each
/// conversation has its own lock.
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<SessionHandle, SessionEntry>>,
}

#[injectable(SessionStore)]
impl InMemorySessionStore {
    #[inject]
    pub fn new() -> InMemorySessionStore {
        InMemorySessionStore {
            sessions: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get_or_create(&self, session: SessionHandle) -> SharedConversation {
        let mut sessions = self.sessions.lock().await;
        let entry = sessions.entry(session).or_insert_with(|| {
            debug!("new session {session}");
            SessionEntry {
                conversation: Arc::new(Mutex::new(Conversation::new())),
                last_seen: Instant::now(),
            }
        });
        entry.last_seen = Instant::now();
        entry.conversation.clone()
    }

    async fn get(&self, session: SessionHandle) -> Option<SharedConversation> {
        let mut sessions = self.sessions.lock().await;
        sessions.get_mut(&session).map(|entry| {
            entry.last_seen = Instant::now();
            entry.conversation.clone()
        })
    }

    async fn evict_idle(&self, max_idle: Duration) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        // an entry referenced elsewhere has a turn in flight
        sessions.retain(|_, entry| {
            entry.last_seen.elapsed() < max_idle || Arc::strong_count(&entry.conversation) > 1
        });
        before - sessions.len()
    }

    async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }
}
