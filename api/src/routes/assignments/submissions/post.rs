use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use chrono::Utc;
use serde::Deserialize;
use services::{intake::IntakeError, policy::SubmissionRequest};
use tracing::error;
use validator::Validate;

use super::common::SubmissionResponse;
use crate::{
    auth::AuthUser,
    response::{ApiError, ApiResponse},
    routes::common::format_validation_errors,
    state::AppState,
};

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitRequest {
    #[validate(url(message = "submission_url must be a valid URL"))]
    pub submission_url: String,
}

/// POST /v1/assignments/{assignment_id}/submission
///
/// Submits an artifact URL for an assignment on behalf of the authenticated
/// account. The artifact is fetched and archived asynchronously; the response
/// only confirms admission.
///
/// ### Request Body
/// ```json
/// { "submission_url": "https://example.com/hw1.zip" }
/// ```
///
/// ### Responses
/// - `201 Created` with the new submission (status `accepted`)
/// - `400 Bad Request` if the body is malformed or the URL invalid
/// - `401 Unauthorized` if the Basic credentials are missing or wrong
/// - `403 Forbidden` if the attempt limit is used up or the deadline has passed
/// - `404 Not Found` if the assignment does not exist
/// - `500 Internal Server Error` if the ledger or dispatch fails
pub async fn submit_assignment(
    State(state): State<AppState>,
    Path(assignment_id): Path<String>,
    AuthUser(account): AuthUser,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<SubmissionResponse>>), ApiError> {
    let Json(req) = payload.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    req.validate()
        .map_err(|errors| ApiError::bad_request(format_validation_errors(&errors)))?;

    let request = SubmissionRequest {
        assignment_id,
        submitter_email: account.email,
        submission_url: req.submission_url,
        submitted_at: Utc::now(),
    };

    match state.intake().submit(request).await {
        Ok(record) => Ok(ApiResponse::created(
            SubmissionResponse::from(record),
            "Submission accepted",
        )),
        Err(IntakeError::Rejected(reason)) => Err(reason.into()),
        Err(e) => {
            error!(error = %e, "Failed to accept submission");
            Err(ApiError::internal("Failed to accept submission"))
        }
    }
}
