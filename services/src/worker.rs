//! Processing of one dispatched submission.
//!
//! A delivery moves through `Fetching -> Storing -> Notifying -> Recording`.
//! Fetch and store failures end the run as `Failed` with a reason; a failed
//! notification is only logged. The terminal transition and its audit entry are
//! committed together, and a record that is already terminal is never touched
//! again, so redelivered messages are acknowledged without side effects.

use crate::archive::{ArchiveStore, ArchivedArtifact, StoreError, storage_key};
use crate::dispatch::{DeliveryHandler, DispatchMessage, HandlerError};
use crate::fetch::{ArtifactFetcher, FetchError};
use crate::notify::{Notification, Notifier};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use db::models::submission::{self, Claim, SubmissionStatus};
use db::models::submission_audit::{self, AuditOutcome, NewAuditEntry};
use sea_orm::{DatabaseConnection, DbErr, TransactionTrait};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, debug, info, info_span, warn};
use util::config::AppConfig;

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Parent directory for per-delivery scratch space.
    pub scratch_root: PathBuf,
    pub fetch_timeout: Duration,
    pub store_timeout: Duration,
    /// A `Processing` claim older than this is assumed abandoned.
    pub stale_after: Duration,
}

impl WorkerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            scratch_root: config.scratch_root(),
            fetch_timeout: config.fetch_timeout(),
            store_timeout: config.store_timeout(),
            stale_after: config.dispatch_lease(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetching,
    Storing,
    Notifying,
    Recording,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    FetchFailed,
    StoreFailed,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::FetchFailed => "FetchFailed",
            FailureKind::StoreFailed => "StoreFailed",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of the fetch and store steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactOutcome {
    Archived {
        file_name: String,
        artifact: ArchivedArtifact,
    },
    Failed {
        kind: FailureKind,
        /// Full error text, for logs only.
        detail: String,
        /// What the submitter is told.
        summary: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationOutcome {
    pub submitter_email: String,
    pub succeeded: bool,
    pub delivered_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Archived { storage_key: String },
    Failed { reason: FailureKind },
    /// The record was already terminal; nothing was repeated.
    Duplicate,
    /// No record exists for the message.
    Discarded,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("ledger error: {0}")]
    Database(#[from] DbErr),
    #[error("submission {0} is being processed by another delivery")]
    InFlight(String),
    #[error("failed to prepare scratch space: {0}")]
    Scratch(#[from] std::io::Error),
}

pub struct ProcessingWorker {
    db: DatabaseConnection,
    fetcher: Arc<dyn ArtifactFetcher>,
    store: Arc<dyn ArchiveStore>,
    notifier: Arc<dyn Notifier>,
    settings: WorkerSettings,
}

impl ProcessingWorker {
    pub fn new(
        db: DatabaseConnection,
        fetcher: Arc<dyn ArtifactFetcher>,
        store: Arc<dyn ArchiveStore>,
        notifier: Arc<dyn Notifier>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            db,
            fetcher,
            store,
            notifier,
            settings,
        }
    }

    /// Handle one delivery of `message`.
    ///
    /// `Ok` means the delivery may be acknowledged. `Err` means it should be
    /// redelivered later.
    pub async fn process(&self, message: &DispatchMessage) -> Result<ProcessOutcome, WorkerError> {
        let span = info_span!("process_submission", submission_id = %message.submission_id);
        self.run(message).instrument(span).await
    }

    async fn run(&self, message: &DispatchMessage) -> Result<ProcessOutcome, WorkerError> {
        let stale_after = chrono::Duration::from_std(self.settings.stale_after)
            .unwrap_or_else(|_| chrono::Duration::seconds(300));

        let record =
            match submission::Model::claim(&self.db, &message.submission_id, Utc::now(), stale_after)
                .await?
            {
                Claim::Claimed(record) => record,
                Claim::Terminal(record) => {
                    info!(status = %record.status, "Submission already finalized, acknowledging duplicate delivery");
                    return Ok(ProcessOutcome::Duplicate);
                }
                Claim::Missing => {
                    warn!("No ledger entry for dispatched submission, discarding message");
                    return Ok(ProcessOutcome::Discarded);
                }
                Claim::InFlight => {
                    return Err(WorkerError::InFlight(message.submission_id.clone()));
                }
            };

        // Removed when dropped, on every path out of this function.
        let scratch = self.scratch_dir()?;

        let outcome = self.fetch_and_store(&record.submission_url, scratch.path()).await;
        let notification = self.notify(&record.submitter_email, &outcome).await;

        debug!(stage = ?Stage::Recording);
        let recorded = self.record(&record, &outcome, &notification).await?;
        debug!(stage = ?Stage::Done);

        if !recorded {
            info!("Submission was finalized by another delivery, skipping audit entry");
            return Ok(ProcessOutcome::Duplicate);
        }

        Ok(match outcome {
            ArtifactOutcome::Archived { artifact, .. } => {
                info!(storage_key = %artifact.storage_key, size_bytes = artifact.size_bytes, "Submission archived");
                ProcessOutcome::Archived {
                    storage_key: artifact.storage_key,
                }
            }
            ArtifactOutcome::Failed { kind, detail, .. } => {
                warn!(reason = %kind, %detail, "Submission failed");
                ProcessOutcome::Failed { reason: kind }
            }
        })
    }

    fn scratch_dir(&self) -> Result<tempfile::TempDir, std::io::Error> {
        util::paths::ensure_dir(&self.settings.scratch_root)?;
        tempfile::Builder::new()
            .prefix("submission-")
            .tempdir_in(&self.settings.scratch_root)
    }

    async fn fetch_and_store(&self, url: &str, scratch: &Path) -> ArtifactOutcome {
        debug!(stage = ?Stage::Fetching, %url);
        let fetched = match tokio::time::timeout(
            self.settings.fetch_timeout,
            self.fetcher.fetch(url, scratch),
        )
        .await
        {
            Ok(Ok(fetched)) => fetched,
            Ok(Err(e)) => return fetch_failed(e),
            Err(_) => return fetch_failed(FetchError::Timeout(self.settings.fetch_timeout)),
        };

        debug!(stage = ?Stage::Storing, file_name = %fetched.file_name, size_bytes = fetched.size_bytes);
        let key = storage_key(&fetched.file_name, Utc::now());
        match tokio::time::timeout(self.settings.store_timeout, self.store.put(&key, &fetched.path))
            .await
        {
            Ok(Ok(artifact)) => ArtifactOutcome::Archived {
                file_name: fetched.file_name,
                artifact,
            },
            Ok(Err(e)) => store_failed(e),
            Err(_) => store_failed(StoreError::Timeout(self.settings.store_timeout)),
        }
    }

    async fn notify(&self, to: &str, outcome: &ArtifactOutcome) -> NotificationOutcome {
        debug!(stage = ?Stage::Notifying);
        let notification = match outcome {
            ArtifactOutcome::Archived {
                file_name,
                artifact,
            } => Notification::success(
                to,
                file_name,
                &self.store.public_reference(&artifact.storage_key),
            ),
            ArtifactOutcome::Failed { kind, summary, .. } => {
                Notification::failure(to, &format!("{kind}: {summary}"))
            }
        };

        match self.notifier.deliver(&notification).await {
            Ok(()) => NotificationOutcome {
                submitter_email: to.to_string(),
                succeeded: true,
                delivered_at: Some(Utc::now()),
            },
            Err(e) => {
                warn!(error = %e, "Failed to notify submitter");
                NotificationOutcome {
                    submitter_email: to.to_string(),
                    succeeded: false,
                    delivered_at: None,
                }
            }
        }
    }

    /// Finalize the record and append its audit entry in one transaction.
    ///
    /// Returns `false` if the record was already terminal.
    async fn record(
        &self,
        record: &submission::Model,
        outcome: &ArtifactOutcome,
        notification: &NotificationOutcome,
    ) -> Result<bool, DbErr> {
        let (status, audit_outcome, reason, key, size_bytes) = match outcome {
            ArtifactOutcome::Archived { artifact, .. } => (
                SubmissionStatus::Archived,
                AuditOutcome::Archived,
                None,
                Some(artifact.storage_key.as_str()),
                Some(artifact.size_bytes),
            ),
            ArtifactOutcome::Failed { kind, .. } => (
                SubmissionStatus::Failed,
                AuditOutcome::Failed,
                Some(kind.as_str()),
                None,
                None,
            ),
        };

        let txn = self.db.begin().await?;

        let transitioned =
            submission::Model::finalize(&txn, &record.id, status, reason, key, Utc::now()).await?;
        if !transitioned {
            txn.rollback().await?;
            return Ok(false);
        }

        submission_audit::Model::append(
            &txn,
            NewAuditEntry {
                submission_id: &record.id,
                submitter_email: &notification.submitter_email,
                outcome: audit_outcome,
                failure_reason: reason,
                storage_key: key,
                size_bytes,
                notified_at: notification.delivered_at,
            },
        )
        .await?;

        txn.commit().await?;
        Ok(true)
    }
}

fn fetch_failed(error: FetchError) -> ArtifactOutcome {
    ArtifactOutcome::Failed {
        kind: FailureKind::FetchFailed,
        summary: error.summary(),
        detail: error.to_string(),
    }
}

fn store_failed(error: StoreError) -> ArtifactOutcome {
    ArtifactOutcome::Failed {
        kind: FailureKind::StoreFailed,
        summary: error.summary().to_string(),
        detail: error.to_string(),
    }
}

#[async_trait]
impl DeliveryHandler for ProcessingWorker {
    async fn handle(&self, message: DispatchMessage) -> Result<(), HandlerError> {
        self.process(&message).await?;
        Ok(())
    }
}
