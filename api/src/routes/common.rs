use axum::{
    http::{HeaderValue, StatusCode, header::CACHE_CONTROL},
    response::{IntoResponse, Response},
};
use validator::ValidationErrors;

use crate::response::ApiError;

pub const NO_CACHE: &str = "no-cache, no-store, must-revalidate";

/// Joins the messages of all field errors with `; `.
pub fn format_validation_errors(errors: &ValidationErrors) -> String {
    errors
        .field_errors()
        .values()
        .flat_map(|errs| {
            errs.iter()
                .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
        })
        .collect::<Vec<_>>()
        .join("; ")
}

pub fn no_cache(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static(NO_CACHE));
    response
}

/// Response for every unrouted path or method.
pub async fn method_not_allowed() -> Response {
    no_cache(ApiError::new(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed").into_response())
}
