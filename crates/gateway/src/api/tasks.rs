//! Task query endpoints.
//!
//! - `POST /api/v1/tasks/query` — paginated task list with filters
//! - `GET  /api/v1/health`      — liveness probe

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};

use tm_domain::task::TaskQuery;

use crate::state::AppState;

/// POST /api/v1/tasks/query
///
/// Response envelope: `{ code, message, data: { total, page, page_size,
/// tasks } }`, sorted `submit_time DESC`.
pub async fn query_tasks(
    State(state): State<AppState>,
    Json(query): Json<TaskQuery>,
) -> impl IntoResponse {
    match state.store.query(&query) {
        Ok(page) => Json(serde_json::json!({
            "code": 200,
            "message": "success",
            "data": page,
        }))
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "task query failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "code": 500,
                    "message": "Internal server error",
                    "data": null,
                })),
            )
                .into_response()
        }
    }
}

/// GET /api/v1/health
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}
