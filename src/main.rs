//! Amtly web server

use amtly_api::api;
use amtly_api::config::Settings;
use amtly_api::core::assistant::OpenAiAssistant;
use amtly_api::core::orchestrator::TurnOrchestrator;
use amtly_api::core::services::StoredConversationService;
use amtly_api::infrastructure::database::DatabaseConnection;
use amtly_api::infrastructure::extraction::FileTextExtractor;
use amtly_api::infrastructure::knowledge::EmbeddingKnowledgeBase;
use amtly_api::infrastructure::repositories::DbConversationRepository;

use anyhow::anyhow;
use axum::http::{HeaderValue, Method};
use di::{Injectable, ServiceCollection};
use di_axum::RouterServiceProviderExtensions;
use log::{info, warn};
use tokio::runtime::{Builder, Runtime};
use tower_http::cors::{Any, CorsLayer};

fn main() -> anyhow::Result<()> {
    // initialize tracing
    tracing_subscriber::fmt::init();

    let runtime: Runtime = Builder::new_multi_thread().enable_all().build()?;

    let web_task_handle = runtime.spawn(web_server_task());

    runtime.block_on(async {
        web_task_handle
            .await
            .map_err(|e| anyhow!("failed to join web task: {e}"))?
    })
}

async fn web_server_task() -> anyhow::Result<()> {
    let provider = ServiceCollection::new()
        .add(Settings::singleton())
        .add(DatabaseConnection::singleton())
        .add(DbConversationRepository::singleton())
        .add(StoredConversationService::singleton())
        .add(OpenAiAssistant::singleton())
        .add(EmbeddingKnowledgeBase::singleton())
        .add(FileTextExtractor::singleton())
        .add(TurnOrchestrator::singleton())
        .build_provider()
        .map_err(|e| anyhow!("invalid service registrations: {e:?}"))?;

    let settings = provider.get_required::<Settings>();
    if !settings.model_configured() {
        warn!("OPENAI_API_KEY is not set, every model call will fall back to the error message");
    }

    provider
        .get_required::<DatabaseConnection>()
        .migrate()
        .await?;

    // build our application with a route
    let app = api::router(settings.max_file_size)
        .layer(
            CorsLayer::new()
                .allow_headers(Any)
                .allow_methods([Method::GET, Method::POST, Method::DELETE])
                .allow_origin([
                    HeaderValue::from_static("http://localhost:3000"),
                    HeaderValue::from_static("http://localhost:5173"),
                ]),
        )
        .with_provider(provider);

    let listener = tokio::net::TcpListener::bind(&settings.bind_address).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    info!("Shutting down...");

    Ok(())
}
