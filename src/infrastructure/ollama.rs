//! Completion client for a local Ollama runtime.
//!
//! Ollama's replies carry many optional fields; only the ones the service needs are decoded
//! into the fixed types below so schema drift stays behind this module.

use crate::core::conversation::{GenerationOptions, Message, ModelName};
use crate::core::errors::ChatError;
use crate::core::traits::CompletionClient;
use crate::infrastructure::settings::Settings;
use async_trait::async_trait;
use di::{Ref, inject, injectable};
use log::{debug, error, info, warn};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub struct OllamaClient {
    base_url: String,
    http: Client,
}

#[injectable(CompletionClient)]
impl OllamaClient {
    #[inject]
    pub fn create(settings: Ref<Settings>) -> OllamaClient {
        OllamaClient::new(&settings.ollama_url, settings.ollama_timeout)
    }
}

impl OllamaClient {
    pub fn new(base_url: &str, timeout: Option<Duration>) -> OllamaClient {
        info!("Using Ollama at: {base_url}");

        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().unwrap_or_else(|e| {
            error!("failed to configure HTTP client, using defaults: {e}");
            Client::new()
        });

        OllamaClient {
            base_url: base_url.trim_end_matches('/').to_owned(),
            http,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[derive(Serialize, Debug)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
    options: WireOptions,
}

#[derive(Serialize, Debug)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize, Debug)]
struct WireOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    message: WireReply,
}

#[derive(Deserialize, Debug)]
struct WireReply {
    content: String,
}

#[derive(Deserialize, Debug)]
struct TagsResponse {
    models: Vec<TagModel>,
}

#[derive(Deserialize, Debug)]
struct TagModel {
    name: String,
}

#[derive(Deserialize, Debug)]
struct ErrorBody {
    error: String,
}

/// Reads the `error` field Ollama puts in failed replies, or the raw body.
async fn error_text(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(ErrorBody { error }) => error,
        Err(_) if body.trim().is_empty() => format!("HTTP {status}"),
        Err(_) => format!("HTTP {status}: {}", body.chars().take(200).collect::<String>()),
    }
}

#[async_trait]
impl CompletionClient for OllamaClient {
    async fn list_models(&self) -> Result<Vec<ModelName>, ChatError> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self.http.get(&url).send().await.map_err(|e| {
            warn!("Ollama unreachable at {url}: {e}");
            ChatError::BackendUnavailable(e.to_string())
        })?;

        if !response.status().is_success() {
            return Err(ChatError::BackendUnavailable(error_text(response).await));
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| ChatError::BackendUnavailable(format!("unexpected reply: {e}")))?;

        Ok(tags.models.into_iter().map(|m| ModelName::from(m.name)).collect())
    }

    async fn complete(
        &self,
        conversation: &[Message],
        options: &GenerationOptions,
    ) -> Result<String, ChatError> {
        let url = format!("{}/api/chat", self.base_url);

        let request = ChatRequest {
            model: options.model.as_str(),
            messages: conversation
                .iter()
                .map(|m| WireMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            stream: false,
            options: WireOptions {
                temperature: options.temperature,
                num_predict: options.max_tokens,
            },
        };

        debug!(
            "Sending {} messages to {} (temperature: {}, num_predict: {})",
            request.messages.len(),
            options.model,
            options.temperature,
            options.max_tokens
        );

        let response = self.http.post(&url).json(&request).send().await.map_err(|e| {
            warn!("Ollama unreachable at {url}: {e}");
            ChatError::BackendUnavailable(e.to_string())
        })?;

        if !response.status().is_success() {
            return Err(ChatError::GenerationError(error_text(response).await));
        }

        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|e| ChatError::GenerationError(format!("unexpected reply: {e}")))?;

        Ok(reply.message.content)
    }
}
