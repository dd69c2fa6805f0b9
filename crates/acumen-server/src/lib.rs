//! HTTP API for the Acumen query engine.
//!
//! Three routes: `POST /queries/execute` runs an AgentQL query and returns the
//! aggregated result, `GET /agents` lists the registered stage agents with
//! their field contracts, and `GET /health` is a liveness probe.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use acumen_pipeline::QueryEngine;
use acumen_types::Result;

pub mod error;
pub mod handlers;
pub mod settings;

pub use error::ApiError;
pub use settings::Settings;

/// Shared handler state: the engine is built once and reused across requests.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<QueryEngine>,
}

impl AppState {
    pub fn new(engine: QueryEngine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }
}

/// Build the API router over the given state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/queries/execute", post(handlers::execute_query))
        .route("/agents", get(handlers::list_agents))
        .route("/health", get(handlers::health_check))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(settings: Settings) -> Result<()> {
    let engine = settings.build_engine();
    let app = router(AppState::new(engine));

    let listener = tokio::net::TcpListener::bind(settings.addr).await?;
    tracing::info!(addr = %settings.addr, "acumen api listening");
    axum::serve(listener, app).await?;
    Ok(())
}
