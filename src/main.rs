use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use whosmost::{
    api,
    app::AppState,
    config::{Config, SWEEP_INTERVAL},
    llm::LlmConfig,
    ws,
};

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "whosmost=debug,tower_http=debug,axum=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting whosmost...");

    let config = Config::from_env();
    let llm_config = LlmConfig::from_env();
    if llm_config.openai_api_key.is_none() && llm_config.ollama_base_url.is_none() {
        tracing::warn!("No LLM provider configured. Pack generation will not be available.");
    }

    let state = Arc::new(AppState::new(config.clone(), llm_config));
    state.registry.spawn_sweeper();
    state.generate_limiter.spawn_cleanup(SWEEP_INTERVAL);

    let app = Router::new()
        .merge(api::router())
        .route("/ws/{room_code}/{client_id}", get(ws::ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from((config.host, config.port));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind listen address");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("server error");
}
