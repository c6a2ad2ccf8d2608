use api::{app, state::AppState};
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{HeaderMap, Response},
};
use chrono::{DateTime, Utc};
use db::models::{account, assignment};
use db::test_utils::setup_test_db;
use headers::{Authorization, HeaderMapExt};
use sea_orm::DatabaseConnection;
use serde_json::Value;
use services::dispatch::{DispatchBroker, OutboxBroker, OutboxSettings};
use std::sync::Arc;
use std::time::Duration;

pub const EMAIL: &str = "student@example.com";
pub const PASSWORD: &str = "correct horse";

pub struct TestApp {
    pub router: Router,
    pub db: DatabaseConnection,
    pub broker: Arc<OutboxBroker>,
}

impl TestApp {
    pub async fn assignment(&self, max_attempts: i32, deadline: DateTime<Utc>) -> assignment::Model {
        assignment::Model::create(&self.db, "Assignment 1", "prof@example.com", 10, max_attempts, deadline)
            .await
            .unwrap()
    }
}

/// App over a fresh in-memory database with one account (`EMAIL` / `PASSWORD`).
pub async fn make_test_app() -> TestApp {
    let db = setup_test_db().await;
    account::Model::create(&db, EMAIL, PASSWORD, "Test", "Student")
        .await
        .unwrap();

    let broker = Arc::new(OutboxBroker::new(
        db.clone(),
        OutboxSettings {
            topic: "submissions".into(),
            lease: Duration::from_secs(60),
            poll_interval: Duration::from_millis(10),
            max_deliveries: 3,
            concurrency: 1,
        },
    ));

    make_app_with_broker(db, broker)
}

pub fn make_app_with_broker(db: DatabaseConnection, broker: Arc<OutboxBroker>) -> TestApp {
    let dyn_broker: Arc<dyn DispatchBroker> = broker.clone();
    TestApp {
        router: app(AppState::new(db.clone(), dyn_broker)),
        db,
        broker,
    }
}

pub fn basic_auth(email: &str, password: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.typed_insert(Authorization::basic(email, password));
    headers
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
