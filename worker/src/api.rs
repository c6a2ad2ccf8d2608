//api.rs
use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use serde::Serialize;
use services::dispatch::{OutboxBroker, SlotStats};
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub topic: String,
    pub slots: SlotStats,
    pub pending: u64,
    pub dead_lettered: u64,
}

/// Status endpoints for a running worker.
pub fn router(broker: Arc<OutboxBroker>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .with_state(broker)
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "worker is running")
}

pub async fn stats(State(broker): State<Arc<OutboxBroker>>) -> impl IntoResponse {
    let slots = broker.stats();

    let counts = async {
        let pending = broker.live_count().await?;
        let dead_lettered = broker.dead_letter_count().await?;
        Ok::<_, services::dispatch::BrokerError>((pending, dead_lettered))
    };

    match counts.await {
        Ok((pending, dead_lettered)) => (
            StatusCode::OK,
            Json(StatsResponse {
                topic: broker.settings().topic.clone(),
                slots,
                pending,
                dead_lettered,
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to read dispatch counts");
            (StatusCode::SERVICE_UNAVAILABLE, "dispatch store unavailable").into_response()
        }
    }
}
