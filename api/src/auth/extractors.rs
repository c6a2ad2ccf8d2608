use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::TypedHeader;
use db::models::account;
use headers::{Authorization, authorization::Basic};
use tracing::{error, warn};

use crate::{response::ApiError, state::AppState};

/// The account behind a request's HTTP Basic credentials.
///
/// The username is the account email; the password is checked against the
/// stored Argon2 hash.
///
/// # Errors
/// - `401 Unauthorized` if the header is missing, malformed, or the credentials
///   don't match an account.
/// - `500 Internal Server Error` if the account lookup fails.
#[derive(Debug, Clone)]
pub struct AuthUser(pub account::Model);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(basic)) =
            TypedHeader::<Authorization<Basic>>::from_request_parts(parts, state)
                .await
                .map_err(|_| {
                    ApiError::unauthorized("Authorization header is missing or not in Basic format.")
                })?;

        match account::Model::verify_credentials(state.db(), basic.username(), basic.password()).await {
            Ok(Some(account)) => Ok(AuthUser(account)),
            Ok(None) => {
                warn!(user = %basic.username(), "Rejected credentials");
                Err(ApiError::unauthorized("Unauthorized"))
            }
            Err(e) => {
                error!(error = %e, "Failed to load account");
                Err(ApiError::internal("Internal server error"))
            }
        }
    }
}
