#![allow(dead_code)]

use async_trait::async_trait;
use axum::{Router, extract::Path, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Duration, Utc};
use db::models::assignment;
use db::models::submission::{self, NewSubmission};
use sea_orm::DatabaseConnection;
use services::archive::{ArchiveStore, ArchivedArtifact, LocalArchiveStore, StoreError};
use services::dispatch::{BrokerError, DispatchBroker, DispatchMessage};
use services::notify::{Notification, Notifier, NotifyError};
use services::worker::{ProcessingWorker, WorkerSettings};
use std::path::{Path as FsPath, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

pub const SUBMITTER: &str = "student@example.com";

/// Bytes served for every `/files/{name}` request.
pub fn artifact_bytes() -> Vec<u8> {
    (0..4096u32).map(|i| (i % 251) as u8).collect()
}

/// Serves `/files/{name}`, `/slow/{name}` and 404 for everything else.
/// Returns the base URL.
pub async fn spawn_artifact_server() -> String {
    async fn file(Path(_name): Path<String>) -> impl IntoResponse {
        (StatusCode::OK, artifact_bytes())
    }

    async fn slow(Path(_name): Path<String>) -> impl IntoResponse {
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        (StatusCode::OK, artifact_bytes())
    }

    let app = Router::new()
        .route("/files/{name}", get(file))
        .route("/slow/{name}", get(slow));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}")
}

pub async fn seed_assignment(
    db: &DatabaseConnection,
    max_attempts: i32,
    deadline: DateTime<Utc>,
) -> assignment::Model {
    assignment::Model::create(db, "Assignment 1", "prof@example.com", 10, max_attempts, deadline)
        .await
        .unwrap()
}

pub async fn open_assignment(db: &DatabaseConnection, max_attempts: i32) -> assignment::Model {
    seed_assignment(db, max_attempts, Utc::now() + Duration::days(7)).await
}

pub async fn seed_submission(
    db: &DatabaseConnection,
    assignment_id: &str,
    url: &str,
) -> submission::Model {
    db::test_utils::seed_submission(
        db,
        NewSubmission {
            assignment_id,
            submitter_email: SUBMITTER,
            submission_url: url,
            submitted_at: Utc::now(),
        },
    )
    .await
}

pub fn settings(scratch_root: &FsPath) -> WorkerSettings {
    WorkerSettings {
        scratch_root: scratch_root.to_path_buf(),
        fetch_timeout: std::time::Duration::from_secs(5),
        store_timeout: std::time::Duration::from_secs(5),
        stale_after: std::time::Duration::from_secs(300),
    }
}

pub fn make_worker(
    db: &DatabaseConnection,
    store: Arc<dyn ArchiveStore>,
    notifier: Arc<dyn Notifier>,
    settings: WorkerSettings,
) -> ProcessingWorker {
    let fetcher = Arc::new(services::fetch::HttpFetcher::new().unwrap());
    ProcessingWorker::new(db.clone(), fetcher, store, notifier, settings)
}

/// Notifier that keeps every message it was asked to send.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Notification>>,
    pub fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(Notification {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        if self.fail {
            let err = "not an address".parse::<lettre::Address>().unwrap_err();
            return Err(err.into());
        }
        Ok(())
    }
}

/// Local store that counts `put` calls.
pub struct CountingStore {
    pub inner: LocalArchiveStore,
    pub puts: AtomicUsize,
}

impl CountingStore {
    pub fn new(root: &FsPath) -> Self {
        Self {
            inner: LocalArchiveStore::new(root.to_str().unwrap(), "submissions-bucket"),
            puts: AtomicUsize::new(0),
        }
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArchiveStore for CountingStore {
    async fn put(&self, key: &str, source: &FsPath) -> Result<ArchivedArtifact, StoreError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(key, source).await
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.inner.get(key).await
    }

    fn public_reference(&self, key: &str) -> String {
        self.inner.public_reference(key)
    }
}

/// Store that is always down.
#[derive(Default)]
pub struct FailingArchiveStore {
    pub attempts: AtomicUsize,
}

#[async_trait]
impl ArchiveStore for FailingArchiveStore {
    async fn put(&self, _key: &str, _source: &FsPath) -> Result<ArchivedArtifact, StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Unavailable("simulated storage outage".into()))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        Err(StoreError::NotFound(key.to_string()))
    }

    fn public_reference(&self, key: &str) -> String {
        format!("down/{key}")
    }
}

/// Broker that refuses every publish.
pub struct FailingBroker;

#[async_trait]
impl DispatchBroker for FailingBroker {
    async fn publish(&self, _message: &DispatchMessage) -> Result<(), BrokerError> {
        Err(BrokerError::Database(sea_orm::DbErr::Custom(
            "broker unavailable".into(),
        )))
    }
}

pub fn entries_in(dir: &FsPath) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(rd) => rd.filter_map(|e| e.ok().map(|e| e.path())).collect(),
        Err(_) => Vec::new(),
    }
}
