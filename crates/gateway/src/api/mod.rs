//! HTTP/WebSocket API surface.

pub mod tasks;
pub mod ws;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::state::AppState;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/tasks/query", post(tasks::query_tasks))
        .route("/api/v1/health", get(tasks::health))
        .route("/api/v1/task/process", get(ws::task_process))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
