//! API Integration Tests
//!
//! Drives the HTTP endpoints through the full DI wiring with the completion client and the
//! history storage replaced by in-process doubles.
//!
//! `more-di` builds services through their `#[inject]` constructors, so the doubles read
//! their scripted behavior from globals. Tests are serialized for that reason.

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use di::{Injectable, ServiceCollection, inject, injectable};
use di_axum::RouterServiceProviderExtensions;
use serde_json::{Value, json};
use serial_test::serial;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio_ollama_chat_api::api;
use tokio_ollama_chat_api::core::conversation::{GenerationOptions, Message, ModelName};
use tokio_ollama_chat_api::core::errors::ChatError;
use tokio_ollama_chat_api::core::services::MyConversationService;
use tokio_ollama_chat_api::core::traits::CompletionClient;
use tokio_ollama_chat_api::infrastructure::session_store::InMemorySessionStore;
use tokio_ollama_chat_api::infrastructure::settings::Settings;
use tokio_ollama_chat_api::infrastructure::traits::HistoryRepository;
use tower::ServiceExt;
use uuid::Uuid;

static REPLIES: Mutex<VecDeque<Result<String, ChatError>>> = Mutex::new(VecDeque::new());
static LAST_OPTIONS: Mutex<Option<GenerationOptions>> = Mutex::new(None);
static BACKEND_DOWN: AtomicBool = AtomicBool::new(false);
static LIST_CALLS: AtomicUsize = AtomicUsize::new(0);
static SAVED: Mutex<Vec<(String, String)>> = Mutex::new(Vec::new());

fn reset_doubles() {
    REPLIES.lock().unwrap().clear();
    *LAST_OPTIONS.lock().unwrap() = None;
    BACKEND_DOWN.store(false, Ordering::SeqCst);
    LIST_CALLS.store(0, Ordering::SeqCst);
    SAVED.lock().unwrap().clear();
}

fn script_reply(reply: Result<&str, ChatError>) {
    REPLIES
        .lock()
        .unwrap()
        .push_back(reply.map(str::to_owned));
}

struct ScriptedClient;

#[injectable(CompletionClient)]
impl ScriptedClient {
    #[inject]
    pub fn create() -> ScriptedClient {
        ScriptedClient
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn list_models(&self) -> Result<Vec<ModelName>, ChatError> {
        LIST_CALLS.fetch_add(1, Ordering::SeqCst);
        if BACKEND_DOWN.load(Ordering::SeqCst) {
            return Err(ChatError::BackendUnavailable(
                "connection refused".to_owned(),
            ));
        }
        Ok(vec![ModelName::from("llama3.2"), ModelName::from("phi3")])
    }

    async fn complete(
        &self,
        _conversation: &[Message],
        options: &GenerationOptions,
    ) -> Result<String, ChatError> {
        *LAST_OPTIONS.lock().unwrap() = Some(options.clone());
        REPLIES
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("ok".to_owned()))
    }
}

struct MemoryHistories;

#[injectable(HistoryRepository)]
impl MemoryHistories {
    #[inject]
    pub fn create() -> MemoryHistories {
        MemoryHistories
    }
}

#[async_trait]
impl HistoryRepository for MemoryHistories {
    async fn save(&self, blob: &str) -> Result<String, ChatError> {
        let mut saved = SAVED.lock().unwrap();
        let filename = format!("chat_history_test_{}.json", saved.len());
        saved.push((filename.clone(), blob.to_owned()));
        Ok(filename)
    }

    async fn load(&self, filename: &str) -> Result<String, ChatError> {
        SAVED
            .lock()
            .unwrap()
            .iter()
            .find(|(name, _)| name == filename)
            .map(|(_, blob)| blob.clone())
            .ok_or_else(|| ChatError::StorageFailure(format!("cannot read {filename}")))
    }
}

/// One app per test; clone it per request so session state carries over.
fn create_test_app() -> Router {
    reset_doubles();

    let provider = ServiceCollection::new()
        .add(Settings::singleton())
        .add(ScriptedClient::singleton())
        .add(InMemorySessionStore::singleton())
        .add(MemoryHistories::singleton())
        .add(MyConversationService::scoped())
        .build_provider()
        .unwrap();

    Router::new()
        .nest("/api", api::chat::router())
        .with_provider(provider)
}

async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn get(uri: &str, session: Uuid) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("X-Session-ID", session.to_string())
        .body(Body::empty())
        .unwrap()
}

fn post(uri: &str, session: Uuid, body: Value) -> Request<Body> {
    post_raw(uri, session, body.to_string())
}

fn post_raw(uri: &str, session: Uuid, body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("X-Session-ID", session.to_string())
        .header("Content-Type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
#[serial]
async fn test_list_models() {
    let app = create_test_app();

    let (status, json) = call(&app, get("/api/models", Uuid::new_v4())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["models"], json!(["llama3.2", "phi3"]));
}

#[tokio::test]
#[serial]
async fn test_list_models_backend_down() {
    let app = create_test_app();
    BACKEND_DOWN.store(true, Ordering::SeqCst);

    let (status, json) = call(&app, get("/api/models", Uuid::new_v4())).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["success"], false);
    assert!(json["error"].as_str().unwrap().contains("connection refused"));
}

#[tokio::test]
#[serial]
async fn test_chat_turn_is_recorded() {
    let app = create_test_app();
    let session = Uuid::new_v4();
    script_reply(Ok("Hi there"));

    let (status, json) = call(
        &app,
        post(
            "/api/chat",
            session,
            json!({"message": "Hello", "model": "m1", "temperature": 0.7, "max_tokens": 100}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["response"], "Hi there");
    assert!(json["response_time"].as_f64().unwrap() >= 0.0);
    assert!(json["timestamp"].is_string());

    let (status, json) = call(&app, get("/api/history", session)).await;
    assert_eq!(status, StatusCode::OK);
    let messages = json["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[0]["content"], "Hello");
    assert!(messages[0].get("response_time").is_none());
    assert_eq!(messages[1]["role"], "assistant");
    assert_eq!(messages[1]["content"], "Hi there");
    assert!(messages[1]["response_time"].is_number());

    let options = LAST_OPTIONS.lock().unwrap().clone().unwrap();
    assert_eq!(options.model, ModelName::from("m1"));
    assert_eq!(options.max_tokens, 100);
}

#[tokio::test]
#[serial]
async fn test_chat_uses_configured_defaults() {
    let app = create_test_app();

    let (status, _) = call(&app, post("/api/chat", Uuid::new_v4(), json!({}))).await;
    assert_eq!(status, StatusCode::OK);

    let defaults = Settings::default();
    let options = LAST_OPTIONS.lock().unwrap().clone().unwrap();
    assert_eq!(options.model, ModelName::from(defaults.default_model));
    assert_eq!(options.temperature, defaults.default_temperature);
    assert_eq!(options.max_tokens, defaults.default_max_tokens);
}

#[tokio::test]
#[serial]
async fn test_failed_turn_keeps_user_message() {
    let app = create_test_app();
    let session = Uuid::new_v4();
    script_reply(Err(ChatError::BackendUnavailable(
        "connection refused".to_owned(),
    )));

    let (status, json) = call(&app, post("/api/chat", session, json!({"message": "Hello"}))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["success"], false);

    let (_, json) = call(&app, get("/api/history", session)).await;
    let messages = json["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["role"], "user");

    // no cached failure: the next listing asks the backend again
    call(&app, get("/api/models", session)).await;
    call(&app, get("/api/models", session)).await;
    assert_eq!(LIST_CALLS.load(Ordering::SeqCst), 2);
}

#[tokio::test]
#[serial]
async fn test_generation_error_status() {
    let app = create_test_app();
    script_reply(Err(ChatError::GenerationError(
        "model \"nope\" not found".to_owned(),
    )));

    let (status, json) = call(
        &app,
        post("/api/chat", Uuid::new_v4(), json!({"message": "hi", "model": "nope"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(json["error"].as_str().unwrap().contains("nope"));
}

#[tokio::test]
#[serial]
async fn test_chat_requires_session_header() {
    let app = create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/chat")
                .header("Content-Type", "application/json")
                .body(Body::from(r#"{"message":"Hello"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[serial]
async fn test_clear_history() {
    let app = create_test_app();
    let session = Uuid::new_v4();

    call(&app, post("/api/chat", session, json!({"message": "Hello"}))).await;

    for _ in 0..2 {
        let (status, json) = call(&app, post_raw("/api/clear", session, String::new())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
    }

    let (_, json) = call(&app, get("/api/history", session)).await;
    assert_eq!(json["messages"].as_array().unwrap().len(), 0);
}

#[tokio::test]
#[serial]
async fn test_sessions_are_isolated() {
    let app = create_test_app();
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();

    call(&app, post("/api/chat", first, json!({"message": "one"}))).await;
    call(&app, post("/api/chat", first, json!({"message": "two"}))).await;
    call(&app, post("/api/chat", second, json!({"message": "three"}))).await;

    let (_, json) = call(&app, get("/api/stats", first)).await;
    assert_eq!(json["total"], 4);
    assert_eq!(json["user"], 2);
    assert_eq!(json["assistant"], 2);

    let (_, json) = call(&app, get("/api/stats", second)).await;
    assert_eq!(json["total"], 2);

    let (_, json) = call(&app, get("/api/history", Uuid::new_v4())).await;
    assert_eq!(json["messages"].as_array().unwrap().len(), 0);
}

#[tokio::test]
#[serial]
async fn test_save_then_load_saved_history() {
    let app = create_test_app();
    let source = Uuid::new_v4();
    let target = Uuid::new_v4();

    call(&app, post("/api/chat", source, json!({"message": "Hello"}))).await;

    let (status, json) = call(&app, get("/api/save", source)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["messages"], 2);
    let filename = json["filename"].as_str().unwrap().to_owned();
    assert!(json["message"].as_str().unwrap().contains(&filename));

    let (status, json) = call(
        &app,
        post_raw(&format!("/api/load/{filename}"), target, String::new()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["messages"], 2);

    let (_, source_history) = call(&app, get("/api/history", source)).await;
    let (_, target_history) = call(&app, get("/api/history", target)).await;
    assert_eq!(source_history, target_history);
}

#[tokio::test]
#[serial]
async fn test_load_raw_history() {
    let app = create_test_app();
    let session = Uuid::new_v4();

    let blob = json!([
        {"role": "user", "content": "Hello"},
        {"role": "assistant", "content": "Hi there", "response_time": 0.42}
    ]);
    let (status, json) = call(&app, post("/api/load", session, blob)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["messages"], 2);

    let (_, json) = call(&app, get("/api/history", session)).await;
    let messages = json["messages"].as_array().unwrap();
    assert_eq!(messages[1]["response_time"], 0.42);
    assert!(messages[0].get("timestamp").is_none());
}

#[tokio::test]
#[serial]
async fn test_load_malformed_history_is_rejected() {
    let app = create_test_app();
    let session = Uuid::new_v4();

    call(&app, post("/api/chat", session, json!({"message": "keep me"}))).await;

    for blob in [
        json!({"role": "user", "content": "x"}),
        json!([{"role": "user"}]),
    ] {
        let (status, json) = call(&app, post("/api/load", session, blob)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["success"], false);
    }

    let (_, json) = call(&app, get("/api/history", session)).await;
    assert_eq!(json["messages"][0]["content"], "keep me");
    assert_eq!(json["messages"].as_array().unwrap().len(), 2);
}

#[tokio::test]
#[serial]
async fn test_load_missing_saved_history() {
    let app = create_test_app();

    let (status, json) = call(
        &app,
        post_raw("/api/load/chat_history_missing.json", Uuid::new_v4(), String::new()),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["success"], false);
}

#[tokio::test]
#[serial]
async fn test_health_check() {
    let app = create_test_app();

    let (status, json) = call(&app, get("/api/health", Uuid::new_v4())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["status"], "Ollama is running");

    BACKEND_DOWN.store(true, Ordering::SeqCst);

    let (status, json) = call(&app, get("/api/health", Uuid::new_v4())).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["success"], false);
    assert_eq!(json["status"], "Ollama is not available");
    assert!(json["error"].is_string());
}
