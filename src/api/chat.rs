//! Chat endpoints

use crate::api::ExtractSession;
use crate::api::chat::schemas::{
    ChatRequest, ChatResponse, HealthResponse, HistoryResponse, LoadResponse, ModelsResponse,
    SaveResponse, StatsResponse, SuccessResponse,
};
use crate::core::conversation::{GenerationOptions, ModelName};
use crate::core::errors::ChatError;
use crate::core::traits::ConversationService;
use crate::infrastructure::settings::Settings;
use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use di_axum::Inject;

pub fn router() -> Router {
    Router::new()
        .route("/models", get(list_models))
        .route("/chat", post(chat))
        .route("/clear", post(clear_history))
        .route("/history", get(get_history))
        .route("/stats", get(get_stats))
        .route("/save", get(save_history))
        .route("/load", post(load_history))
        .route("/load/:filename", post(load_saved_history))
        .route("/health", get(health_check))
}

async fn list_models(
    Inject(conversation_service): Inject<dyn ConversationService>,
) -> Result<Json<ModelsResponse>, ChatError> {
    let models = conversation_service.list_models().await?;

    Ok(Json(ModelsResponse {
        success: true,
        models,
    }))
}

async fn chat(
    Inject(conversation_service): Inject<dyn ConversationService>,
    Inject(settings): Inject<Settings>,
    ExtractSession(session): ExtractSession,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ChatError> {
    let options = GenerationOptions {
        model: request
            .model
            .map(ModelName::from)
            .unwrap_or_else(|| ModelName::from(settings.default_model.clone())),
        temperature: request.temperature.unwrap_or(settings.default_temperature),
        max_tokens: request.max_tokens.unwrap_or(settings.default_max_tokens),
    };

    let reply = conversation_service
        .send_turn(session, request.message, options)
        .await?;

    Ok(Json(ChatResponse {
        success: true,
        response: reply.content,
        response_time: reply.response_time.as_secs_f64(),
        timestamp: reply.timestamp,
    }))
}

async fn clear_history(
    Inject(conversation_service): Inject<dyn ConversationService>,
    ExtractSession(session): ExtractSession,
) -> Json<SuccessResponse> {
    conversation_service.clear(session).await;

    Json(SuccessResponse { success: true })
}

async fn get_history(
    Inject(conversation_service): Inject<dyn ConversationService>,
    ExtractSession(session): ExtractSession,
) -> Json<HistoryResponse> {
    Json(HistoryResponse {
        success: true,
        messages: conversation_service.history(session).await,
    })
}

async fn get_stats(
    Inject(conversation_service): Inject<dyn ConversationService>,
    ExtractSession(session): ExtractSession,
) -> Json<StatsResponse> {
    Json(StatsResponse {
        success: true,
        stats: conversation_service.stats(session).await,
    })
}

async fn save_history(
    Inject(conversation_service): Inject<dyn ConversationService>,
    ExtractSession(session): ExtractSession,
) -> Result<Json<SaveResponse>, ChatError> {
    let saved = conversation_service.persist(session).await?;

    Ok(Json(SaveResponse {
        success: true,
        message: format!("Chat history saved to {}", saved.filename),
        filename: saved.filename,
        messages: saved.messages,
    }))
}

async fn load_history(
    Inject(conversation_service): Inject<dyn ConversationService>,
    ExtractSession(session): ExtractSession,
    body: String,
) -> Result<Json<LoadResponse>, ChatError> {
    let messages = conversation_service.restore(session, &body).await?;

    Ok(Json(LoadResponse {
        success: true,
        messages,
    }))
}

async fn load_saved_history(
    Inject(conversation_service): Inject<dyn ConversationService>,
    ExtractSession(session): ExtractSession,
    Path(filename): Path<String>,
) -> Result<Json<LoadResponse>, ChatError> {
    let messages = conversation_service
        .restore_saved(session, &filename)
        .await?;

    Ok(Json(LoadResponse {
        success: true,
        messages,
    }))
}

async fn health_check(
    Inject(conversation_service): Inject<dyn ConversationService>,
) -> (StatusCode, Json<HealthResponse>) {
    let health = conversation_service.health().await;

    let status = if health.available {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(HealthResponse::from(health)))
}

pub mod schemas {
    use crate::core::conversation::{ConversationStats, Message, ModelName};
    use crate::core::traits::BackendHealth;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};

    #[derive(Deserialize, Debug)]
    pub struct ChatRequest {
        #[serde(default)]
        pub message: String,
        pub model: Option<String>,
        pub temperature: Option<f32>,
        pub max_tokens: Option<u32>,
    }

    #[derive(Serialize, Debug)]
    pub struct ChatResponse {
        pub success: bool,
        pub response: String,
        /// Seconds
        pub response_time: f64,
        pub timestamp: DateTime<Utc>,
    }

    #[derive(Serialize, Debug)]
    pub struct ModelsResponse {
        pub success: bool,
        pub models: Vec<ModelName>,
    }

    #[derive(Serialize, Debug)]
    pub struct SuccessResponse {
        pub success: bool,
    }

    #[derive(Serialize, Debug)]
    pub struct HistoryResponse {
        pub success: bool,
        pub messages: Vec<Message>,
    }

    #[derive(Serialize, Debug)]
    pub struct StatsResponse {
        pub success: bool,
        #[serde(flatten)]
        pub stats: ConversationStats,
    }

    #[derive(Serialize, Debug)]
    pub struct SaveResponse {
        pub success: bool,
        pub filename: String,
        pub messages: usize,
        pub message: String,
    }

    #[derive(Serialize, Debug)]
    pub struct LoadResponse {
        pub success: bool,
        pub messages: usize,
    }

    #[derive(Serialize, Debug)]
    pub struct HealthResponse {
        pub success: bool,
        pub status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub error: Option<String>,
        pub timestamp: DateTime<Utc>,
    }

    impl From<BackendHealth> for HealthResponse {
        fn from(health: BackendHealth) -> Self {
            HealthResponse {
                success: health.available,
                status: health.status,
                error: health.error,
                timestamp: health.checked_at,
            }
        }
    }
}
