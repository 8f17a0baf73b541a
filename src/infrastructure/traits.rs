//! Infrastructure traits, used for DI on higher levels

use crate::core::conversation::{Conversation, SessionHandle};
use crate::core::errors::ChatError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// One conversation behind its own lock. Holding the guard makes the holder the single
/// writer for that session.
pub type SharedConversation = Arc<Mutex<Conversation>>;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns the session's conversation, creating an empty one if needed.
    async fn get_or_create(&self, session: SessionHandle) -> SharedConversation;

    /// Returns the session's conversation without creating it.
    async fn get(&self, session: SessionHandle) -> Option<SharedConversation>;

    /// Drops sessions that have not been touched for `max_idle`. Returns how many were
    /// removed.
    async fn evict_idle(&self, max_idle: Duration) -> usize;

    async fn len(&self) -> usize;
}

#[async_trait]
pub trait HistoryRepository: Send + Sync {
    /// Stores a serialized history and returns the file name it was stored under.
    async fn save(&self, blob: &str) -> Result<String, ChatError>;

    async fn load(&self, filename: &str) -> Result<String, ChatError>;
}
