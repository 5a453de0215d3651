//! HTTP API for the leetcrew solver.
//!
//! # Endpoints
//!
//! - `GET /` and `GET /health` - Health check with the agent names
//! - `GET /agents` - Roles, titles and responsibilities in stage order
//! - `POST /solve` - Run the pipeline for `{"problem": "..."}`
//!
//! `/solve` answers 200 on success, 400 for a missing or blank problem, 500
//! when a stage fails and 504 when the run exceeds its time limit. The
//! request id is echoed in the `x-request-id` header.

pub mod routes;
pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use state::AppState;

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// Create the API router with all routes configured.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(routes::health))
        .route("/health", get(routes::health))
        .route("/agents", get(routes::agents))
        .route("/solve", post(routes::solve))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the API server on the given address.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> anyhow::Result<()> {
    let router = create_router(state);

    info!(%addr, "Starting leetcrew API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
