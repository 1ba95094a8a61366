//! Acting user extractor
//!
//! Callers identify the user performing an action with the `x-user-id`
//! header. Authentication happens upstream; this only parses the id.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::api::types::ApiError;

/// Header carrying the numeric id of the acting user
pub const USER_ID_HEADER: &str = "x-user-id";

/// Extractor for the user performing a workflow action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActingUser(pub i64);

impl<S> FromRequestParts<S> for ActingUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        extract_user_id(&parts.headers).map(ActingUser)
    }
}

fn extract_user_id(headers: &axum::http::HeaderMap) -> Result<i64, ApiError> {
    let value = headers.get(USER_ID_HEADER).ok_or_else(|| {
        ApiError::bad_request(format!(
            "Acting user required. Provide the user id via the '{}' header",
            USER_ID_HEADER
        ))
    })?;

    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<i64>().ok())
        .ok_or_else(|| {
            ApiError::bad_request(format!("Header '{}' must be an integer", USER_ID_HEADER))
                .with_param(USER_ID_HEADER)
        })
}
