//! HTTP API layer.

pub mod error;
pub mod health;
pub mod jobs;
pub mod settings;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Create the router with all endpoints. The body limit covers a whole batch.
pub fn create_router(state: AppState) -> Router {
    let body_limit = state.manager.config().max_upload_bytes();

    Router::new()
        .route("/", get(settings::index))
        .route("/health", get(health::health_check))
        .route("/notify-test", post(settings::notify_test))
        // Job endpoints
        .route("/process", post(jobs::process))
        .route("/status/{id}", get(jobs::status))
        .route("/download/{id}", get(jobs::download))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
}
