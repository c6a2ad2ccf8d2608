//! Submission admission policy.
//!
//! `evaluate` is a pure function of its inputs. The caller supplies the
//! assignment limits and the number of attempts already admitted; the clock is
//! the request's own `submitted_at`.

use chrono::{DateTime, Utc};
use db::models::assignment;
use serde::Serialize;

/// A submission as received at the edge, before admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRequest {
    pub assignment_id: String,
    /// Email of the authenticated submitter.
    pub submitter_email: String,
    pub submission_url: String,
    pub submitted_at: DateTime<Utc>,
}

/// The limits an assignment places on submissions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentPolicy {
    pub assignment_id: String,
    pub max_attempts: u32,
    pub deadline: DateTime<Utc>,
}

impl From<&assignment::Model> for AssignmentPolicy {
    fn from(model: &assignment::Model) -> Self {
        Self {
            assignment_id: model.id.clone(),
            max_attempts: u32::try_from(model.max_attempts).unwrap_or(0),
            deadline: model.deadline,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RejectReason {
    NotFound,
    AttemptsExceeded,
    PastDeadline,
}

impl RejectReason {
    /// Message returned to the submitter.
    pub fn message(self) -> &'static str {
        match self {
            RejectReason::NotFound => "Assignment not found.",
            RejectReason::AttemptsExceeded => {
                "Forbidden: The number of attempts for this assignment has exceeded the limit."
            }
            RejectReason::PastDeadline => "Forbidden: Your submission is too late.",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Admit,
    Reject(RejectReason),
}

/// Decide whether `request` may be admitted.
///
/// Rules apply in order and the first match wins: unknown assignment, then the
/// attempt limit, then the deadline. A submitter out of attempts is told so even
/// when the deadline has also passed.
pub fn evaluate(
    request: &SubmissionRequest,
    policy: Option<&AssignmentPolicy>,
    prior_attempts: u64,
) -> Decision {
    let Some(policy) = policy.filter(|p| p.assignment_id == request.assignment_id) else {
        return Decision::Reject(RejectReason::NotFound);
    };

    if prior_attempts.saturating_add(1) > u64::from(policy.max_attempts) {
        return Decision::Reject(RejectReason::AttemptsExceeded);
    }

    if request.submitted_at > policy.deadline {
        return Decision::Reject(RejectReason::PastDeadline);
    }

    Decision::Admit
}
