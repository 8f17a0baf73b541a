//! DI "Interfaces"

use crate::core::conversation::{
    ConversationStats, GenerationOptions, Message, ModelName, SessionHandle, TurnReply,
};
use crate::core::errors::ChatError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// The external text generation capability.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Lists the models the runtime currently offers.
    ///
    /// Returns `BackendUnavailable` if the runtime cannot be reached.
    async fn list_models(&self) -> Result<Vec<ModelName>, ChatError>;

    /// Generates the next assistant reply for `conversation`.
    ///
    /// Returns `BackendUnavailable` when the runtime is down and `GenerationError` when it
    /// rejected the request.
    async fn complete(
        &self,
        conversation: &[Message],
        options: &GenerationOptions,
    ) -> Result<String, ChatError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackendHealth {
    pub available: bool,
    pub status: String,
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SavedHistory {
    pub filename: String,
    pub messages: usize,
}

/// Session controller: the operations both front-ends bind to.
#[async_trait]
pub trait ConversationService: Send + Sync {
    /// Queries the completion client for its models. Never cached.
    async fn list_models(&self) -> Result<Vec<ModelName>, ChatError>;

    /// Appends the user message, asks for a completion and appends the reply.
    ///
    /// On failure the user message stays in the conversation and no assistant message is
    /// added.
    async fn send_turn(
        &self,
        session: SessionHandle,
        user_text: String,
        options: GenerationOptions,
    ) -> Result<TurnReply, ChatError>;

    /// Resets the conversation to empty. Idempotent. Waits for a turn in flight on the
    /// same session to finish.
    async fn clear(&self, session: SessionHandle);

    /// Returns the conversation in insertion order, empty for unknown sessions.
    /// Waits for a turn in flight on the same session to finish.
    async fn history(&self, session: SessionHandle) -> Vec<Message>;

    /// Message counts by role. Waits for a turn in flight on the same session to finish.
    async fn stats(&self, session: SessionHandle) -> ConversationStats;

    /// Writes the conversation to durable storage.
    async fn persist(&self, session: SessionHandle) -> Result<SavedHistory, ChatError>;

    /// Replaces the conversation with the messages in `blob`.
    ///
    /// Returns `MalformedHistory` and leaves the conversation untouched if `blob` is not a
    /// JSON array of messages.
    async fn restore(&self, session: SessionHandle, blob: &str) -> Result<usize, ChatError>;

    /// Restores a history previously written by [`ConversationService::persist`].
    async fn restore_saved(
        &self,
        session: SessionHandle,
        filename: &str,
    ) -> Result<usize, ChatError>;

    async fn health(&self) -> BackendHealth;
}
