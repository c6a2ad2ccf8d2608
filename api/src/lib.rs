pub mod auth;
pub mod response;
pub mod routes;
pub mod state;

use axum::{Router, middleware::from_fn};
use tower_http::cors::CorsLayer;

use crate::{auth::middleware::log_request, routes::routes, state::AppState};

/// The full HTTP application: routes, request logging and CORS.
pub fn app(state: AppState) -> Router {
    routes(state)
        .layer(from_fn(log_request))
        .layer(CorsLayer::permissive())
}
