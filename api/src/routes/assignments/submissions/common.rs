use db::models::submission::{Model as Submission, SubmissionStatus};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct SubmissionResponse {
    pub id: String,
    pub assignment_id: String,
    pub submission_url: String,
    pub email: String,
    pub status: SubmissionStatus,
    pub submission_date: String,
    pub submission_updated: String,
}

impl From<Submission> for SubmissionResponse {
    fn from(submission: Submission) -> Self {
        Self {
            id: submission.id,
            assignment_id: submission.assignment_id,
            submission_url: submission.submission_url,
            email: submission.submitter_email,
            status: submission.status,
            submission_date: submission.created_at.to_rfc3339(),
            submission_updated: submission.updated_at.to_rfc3339(),
        }
    }
}
