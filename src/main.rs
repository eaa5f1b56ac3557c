//! Recipe Ingest - hosting shell for the ingestion router.

use axum::{
    extract::State,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use recipe_ingest::config::AppConfig;
use recipe_ingest::router::EventRouter;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Clone)]
struct AppState {
    router: Arc<EventRouter>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "recipe_ingest=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    info!(
        "Configuration loaded: environment={}, model={}, region={}",
        config.environment, config.extraction_model, config.region
    );

    let bind_addr = config.bind_addr.clone();
    let state = AppState {
        router: Arc::new(EventRouter::new(config)?),
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/events", post(handle_event))
        .route("/extract", post(extract))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Server listening on http://{bind_addr}");
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// Health of the service's external collaborators.
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.router.health().await)
}

/// Full event intake: storage-upload batches, job-completion batches and
/// direct requests are all accepted here.
async fn handle_event(State(state): State<AppState>, Json(event): Json<Value>) -> impl IntoResponse {
    state.router.handle(event).await
}

/// Convenience endpoint for direct extraction requests.
async fn extract(State(state): State<AppState>, Json(payload): Json<Value>) -> impl IntoResponse {
    state.router.handle(json!({ "body": payload })).await
}
