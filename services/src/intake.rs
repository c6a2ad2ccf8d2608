use crate::dispatch::{BrokerError, DispatchBroker, DispatchMessage};
use crate::policy::{AssignmentPolicy, Decision, RejectReason, SubmissionRequest, evaluate};
use db::models::assignment;
use db::models::submission::{self, NewSubmission};
use sea_orm::{DatabaseConnection, DbErr};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("{0}")]
    Rejected(RejectReason),
    #[error("ledger error: {0}")]
    Database(#[from] DbErr),
    #[error("failed to dispatch submission: {0}")]
    Publish(#[from] BrokerError),
}

/// Synchronous edge of the pipeline: admit, record, dispatch.
#[derive(Clone)]
pub struct IntakeService {
    db: DatabaseConnection,
    broker: Arc<dyn DispatchBroker>,
}

impl IntakeService {
    pub fn new(db: DatabaseConnection, broker: Arc<dyn DispatchBroker>) -> Self {
        Self { db, broker }
    }

    /// Admit `request`, record it as `Accepted` and publish it for processing.
    ///
    /// Rejections write nothing. If publishing fails the new record is removed
    /// again and the error is returned.
    pub async fn submit(
        &self,
        request: SubmissionRequest,
    ) -> Result<submission::Model, IntakeError> {
        let assignment = assignment::Model::find_by_id(&self.db, &request.assignment_id).await?;
        let policy = assignment.as_ref().map(AssignmentPolicy::from);

        let prior_attempts = match &assignment {
            Some(_) => {
                submission::Model::count_attempts(
                    &self.db,
                    &request.assignment_id,
                    &request.submitter_email,
                )
                .await?
            }
            None => 0,
        };

        let assignment = match (evaluate(&request, policy.as_ref(), prior_attempts), assignment) {
            (Decision::Admit, Some(assignment)) => assignment,
            (Decision::Admit, None) => return Err(self.reject(&request, RejectReason::NotFound)),
            (Decision::Reject(reason), _) => return Err(self.reject(&request, reason)),
        };

        // The count above is advisory; the conditional insert is authoritative.
        let record = submission::Model::create_within_limit(
            &self.db,
            NewSubmission {
                assignment_id: &request.assignment_id,
                submitter_email: &request.submitter_email,
                submission_url: &request.submission_url,
                submitted_at: request.submitted_at,
            },
            assignment.max_attempts,
        )
        .await?
        .ok_or_else(|| self.reject(&request, RejectReason::AttemptsExceeded))?;

        if let Err(e) = self.broker.publish(&DispatchMessage::from(&record)).await {
            error!(
                submission_id = %record.id,
                error = %e,
                "Failed to dispatch submission, rolling back admission"
            );
            if let Err(rollback) = submission::Model::rollback_admission(&self.db, &record.id).await
            {
                error!(submission_id = %record.id, error = %rollback, "Rollback of admission failed");
            }
            return Err(e.into());
        }

        info!(
            submission_id = %record.id,
            assignment_id = %record.assignment_id,
            submitter = %record.submitter_email,
            attempt = prior_attempts + 1,
            "Submission accepted"
        );
        Ok(record)
    }

    fn reject(&self, request: &SubmissionRequest, reason: RejectReason) -> IntakeError {
        info!(
            assignment_id = %request.assignment_id,
            submitter = %request.submitter_email,
            reason = ?reason,
            "Submission rejected"
        );
        IntakeError::Rejected(reason)
    }
}
