//! Chat session web server for a local Ollama runtime

use tokio_ollama_chat_api::api;
use tokio_ollama_chat_api::core::services::MyConversationService;
use tokio_ollama_chat_api::core::traits::CompletionClient;
use tokio_ollama_chat_api::infrastructure::history::FsHistoryRepository;
use tokio_ollama_chat_api::infrastructure::ollama::OllamaClient;
use tokio_ollama_chat_api::infrastructure::session_store::InMemorySessionStore;
use tokio_ollama_chat_api::infrastructure::settings::Settings;
use tokio_ollama_chat_api::infrastructure::traits::SessionStore;

use anyhow::anyhow;
use axum::Router;
use axum::http::{HeaderValue, Method};
use axum::response::Html;
use axum::routing::get;
use di::{Injectable, Ref, ServiceCollection, ServiceProvider};
use di_axum::RouterServiceProviderExtensions;
use log::{info, warn};
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

fn main() -> anyhow::Result<()> {
    // initialize tracing
    tracing_subscriber::fmt::init();

    let runtime: Runtime = Builder::new_multi_thread().enable_all().build()?;

    let provider = ServiceCollection::new()
        .add(Settings::singleton())
        .add(OllamaClient::singleton())
        .add(InMemorySessionStore::singleton())
        .add(FsHistoryRepository::singleton())
        .add(MyConversationService::scoped())
        .build_provider()
        .map_err(|e| anyhow!("invalid service registrations: {e:?}"))?;

    let settings = provider.get_required::<Settings>();

    runtime.block_on(check_backend(provider.get_required::<dyn CompletionClient>()));

    // background task evicting idle sessions
    let reaper_handle = runtime.spawn(session_reaper(
        provider.get_required::<dyn SessionStore>(),
        settings.session_idle,
    ));

    let web_task_handle = runtime.spawn(web_server_task(provider, settings));

    runtime.block_on(async {
        let served = web_task_handle.await?;
        reaper_handle.abort();
        served
    })
}

async fn check_backend(client: Ref<dyn CompletionClient>) {
    match client.list_models().await {
        Ok(models) => {
            let names: Vec<&str> = models.iter().map(|m| m.as_str()).collect();
            info!("Ollama is available, models: {}", names.join(", "));
        }
        Err(e) => {
            warn!("Ollama is not available: {e}");
            warn!(
                "Ensure Ollama is installed, the server is running (`ollama serve`) \
                 and at least one model is pulled (`ollama pull llama3.2`)"
            );
        }
    }
}

async fn session_reaper(sessions: Ref<dyn SessionStore>, max_idle: Duration) {
    let period = (max_idle / 4).max(Duration::from_secs(1));
    let mut interval = tokio::time::interval(period);

    loop {
        interval.tick().await;
        let evicted = sessions.evict_idle(max_idle).await;
        if evicted > 0 {
            info!("Evicted {evicted} idle sessions, {} remain", sessions.len().await);
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("ignoring invalid CORS origin {origin:?}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_headers(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(origins)
}

async fn web_server_task(provider: ServiceProvider, settings: Ref<Settings>) -> anyhow::Result<()> {
    // build our application with a route
    let app = Router::new()
        .route("/", get(index))
        .nest_service(
            "/static",
            ServiceBuilder::new().service(ServeDir::new("static")),
        )
        .nest("/api", api::chat::router())
        .layer(cors_layer(&settings.cors_origins))
        .with_provider(provider);

    let listener = tokio::net::TcpListener::bind(&settings.bind_address).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;
    info!("Shutting down...");

    Ok(())
}

async fn index() -> Html<&'static str> {
    Html(include_str!("../static/index.html"))
}
