//! REST API for health and prediction.
//!
//! - `GET /`: readiness banner
//! - `GET /health`: lifecycle state and model version
//! - `POST /predict`: run one observation through the inference pipeline

mod handlers;
mod types;

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tracing::{info, warn};

use crate::service::InferenceService;

pub use types::{ErrorResponse, RootResponse};

/// Application state shared across all request handlers.
///
/// The service holds the model artifact behind a write-once cell, so
/// handlers only ever take shared references; the prediction log does its
/// own locking.
pub struct AppState {
    /// The inference pipeline.
    pub service: InferenceService,
}

/// Builds the axum router with all API routes.
///
/// # Arguments
///
/// * `state` - Shared application state
///
/// # Returns
///
/// Configured `Router` ready to serve.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::get_root))
        .route("/health", get(handlers::get_health))
        .route("/predict", post(handlers::post_predict))
        .with_state(state)
}

/// Binds to `addr` and serves until Ctrl-C.
///
/// # Arguments
///
/// * `state` - Shared application state, already started
/// * `addr` - Socket address to bind to
///
/// # Errors
///
/// Returns an `io::Error` if the listener cannot bind or the server fails.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API server listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
