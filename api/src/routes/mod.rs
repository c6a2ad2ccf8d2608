//! HTTP routes.
//!
//! - `GET /healthz` → liveness plus a database ping (public)
//! - `POST /v1/assignments/{assignment_id}/submission` → submit an artifact URL
//!   (HTTP Basic auth); also served without the `/v1` prefix
//!
//! Anything else answers `405 Method Not Allowed`.

use axum::Router;

use crate::routes::{
    assignments::assignment_routes,
    common::method_not_allowed,
    health::health_routes,
};
use crate::state::AppState;

pub mod assignments;
pub mod common;
pub mod health;

/// Builds the application router with its state applied.
pub fn routes(app_state: AppState) -> Router {
    Router::new()
        .merge(health_routes())
        .merge(assignment_routes())
        .fallback(method_not_allowed)
        .method_not_allowed_fallback(method_not_allowed)
        .with_state(app_state)
}
