use axum::{Router, routing::post};

use crate::state::AppState;

pub mod submissions;

use submissions::post::submit_assignment;

/// Assignment routes.
///
/// - `POST /v1/assignments/{assignment_id}/submission` → submit an artifact URL
/// - `POST /assignments/{assignment_id}/submission` → same, unversioned
pub fn assignment_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/assignments/{assignment_id}/submission",
            post(submit_assignment),
        )
        .route(
            "/assignments/{assignment_id}/submission",
            post(submit_assignment),
        )
}
