//! Token authentication.
//!
//! Accepts `Authorization: Bearer <token>` or `X-Api-Key: <token>` and maps
//! the token to a configured user. The resulting [`Session`] is stored as a
//! request extension for the handlers.

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::AppState;
use crate::error::ApiError;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Extract the caller's token from the request headers.
pub fn token(headers: &HeaderMap) -> Option<&str> {
    if let Some(bearer) = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        return Some(bearer.trim());
    }
    headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
}

/// Reject requests without a known token; attach the session otherwise.
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let session = token(request.headers()).and_then(|t| state.users.get(t)).cloned();

    match session {
        Some(session) => {
            request.extensions_mut().insert(session);
            next.run(request).await
        }
        None => {
            tracing::warn!(uri = %request.uri(), "rejected request without a valid token");
            ApiError::unauthorized().into_response()
        }
    }
}
