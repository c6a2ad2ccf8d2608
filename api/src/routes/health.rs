use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use tracing::warn;

use crate::{
    response::{ApiError, ApiResponse},
    routes::common::no_cache,
    state::AppState,
};

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/healthz", get(health_check))
}

/// GET /healthz
///
/// ### Responses
/// - `200 OK` when the database answers a ping
/// - `503 Service Unavailable` otherwise
///
/// Both carry `Cache-Control: no-cache, no-store, must-revalidate`.
pub async fn health_check(State(state): State<AppState>) -> Response {
    let response = match state.db().ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::success("OK", "Health check passed")),
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Health check failed, database unreachable");
            ApiError::unavailable("Database unavailable").into_response()
        }
    };
    no_cache(response)
}
