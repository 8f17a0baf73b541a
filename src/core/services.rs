//! Implementations for the service the app needs.
//!

use crate::core::conversation::{
    Conversation, ConversationStats, GenerationOptions, Message, ModelName, SessionHandle,
    TurnReply,
};
use crate::core::errors::ChatError;
use crate::core::traits::{BackendHealth, CompletionClient, ConversationService, SavedHistory};
use crate::infrastructure::traits::{HistoryRepository, SessionStore};
use async_trait::async_trait;
use chrono::Utc;
use di::{Ref, inject, injectable};
use log::{info, warn};
use tokio::time::Instant;

pub struct MyConversationService {
    client: Ref<dyn CompletionClient>,
    sessions: Ref<dyn SessionStore>,
    histories: Ref<dyn HistoryRepository>,
}

#[injectable(ConversationService)]
impl MyConversationService {
    #[inject]
    pub fn new(
        client: Ref<dyn CompletionClient>,
        sessions: Ref<dyn SessionStore>,
        histories: Ref<dyn HistoryRepository>,
    ) -> MyConversationService {
        MyConversationService {
            client,
            sessions,
            histories,
        }
    }
}

#[async_trait]
impl ConversationService for MyConversationService {
    async fn list_models(&self) -> Result<Vec<ModelName>, ChatError> {
        self.client.list_models().await
    }

    async fn send_turn(
        &self,
        session: SessionHandle,
        user_text: String,
        options: GenerationOptions,
    ) -> Result<TurnReply, ChatError> {
        let conversation = self.sessions.get_or_create(session).await;
        // held until the reply is appended: one writer per session
        let mut conversation = conversation.lock().await;

        conversation.push(Message::user(user_text));

        info!(
            "Turn for session {session} with model {} ({} messages)",
            options.model,
            conversation.len()
        );

        let started = Instant::now();
        let result = self
            .client
            .complete(conversation.messages(), &options)
            .await;
        let response_time = started.elapsed();

        match result {
            Ok(content) => {
                let reply = Message::assistant(content, response_time);
                let timestamp = reply.timestamp.unwrap_or_else(Utc::now);
                let content = reply.content.clone();
                conversation.push(reply);

                info!(
                    "Response for session {session} received in {:.2}s",
                    response_time.as_secs_f64()
                );

                Ok(TurnReply {
                    content,
                    response_time,
                    timestamp,
                })
            }
            Err(e) => {
                warn!("Turn for session {session} failed: {e}");
                Err(e)
            }
        }
    }

    async fn clear(&self, session: SessionHandle) {
        if let Some(conversation) = self.sessions.get(session).await {
            conversation.lock().await.clear();
        }
    }

    async fn history(&self, session: SessionHandle) -> Vec<Message> {
        match self.sessions.get(session).await {
            Some(conversation) => conversation.lock().await.messages().to_vec(),
            None => Vec::new(),
        }
    }

    async fn stats(&self, session: SessionHandle) -> ConversationStats {
        match self.sessions.get(session).await {
            Some(conversation) => conversation.lock().await.stats(),
            None => ConversationStats::default(),
        }
    }

    async fn persist(&self, session: SessionHandle) -> Result<SavedHistory, ChatError> {
        let (blob, messages) = match self.sessions.get(session).await {
            Some(conversation) => {
                let conversation = conversation.lock().await;
                (conversation.to_json()?, conversation.len())
            }
            None => (Conversation::new().to_json()?, 0),
        };

        let filename = self.histories.save(&blob).await?;
        Ok(SavedHistory { filename, messages })
    }

    async fn restore(&self, session: SessionHandle, blob: &str) -> Result<usize, ChatError> {
        // parse before touching the session so a bad blob leaves it as it was
        let restored = Conversation::from_json(blob)?;
        let count = restored.len();

        let conversation = self.sessions.get_or_create(session).await;
        *conversation.lock().await = restored;

        info!("Restored {count} messages into session {session}");
        Ok(count)
    }

    async fn restore_saved(
        &self,
        session: SessionHandle,
        filename: &str,
    ) -> Result<usize, ChatError> {
        let blob = self.histories.load(filename).await?;
        self.restore(session, &blob).await
    }

    async fn health(&self) -> BackendHealth {
        match self.client.list_models().await {
            Ok(_) => BackendHealth {
                available: true,
                status: "Ollama is running".to_owned(),
                error: None,
                checked_at: Utc::now(),
            },
            Err(e) => BackendHealth {
                available: false,
                status: "Ollama is not available".to_owned(),
                error: Some(e.to_string()),
                checked_at: Utc::now(),
            },
        }
    }
}
