//! HTTP error responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use vfsgate_core::VfsError;

/// An error rendered as `{ "error": ..., "stack": ... }`.
///
/// `stack` carries the debug form of the underlying error and is only
/// present when the server runs in development mode.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    stack: Option<String>,
}

impl ApiError {
    pub fn from_vfs(err: VfsError, development: bool) -> Self {
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::BAD_REQUEST);
        Self {
            status,
            message: err.to_string(),
            stack: development.then(|| format!("{err:?}")),
        }
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Unauthorized")
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            stack: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, error = %self.message, "request failed");
        } else {
            tracing::debug!(status = %self.status, error = %self.message, "request rejected");
        }

        let body = match self.stack {
            Some(stack) => json!({ "error": self.message, "stack": stack }),
            None => json!({ "error": self.message }),
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let err = ApiError::from_vfs(VfsError::ReadOnly("dist".into()), false);
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.message, "Mountpoint 'dist' is read-only");
        assert!(err.stack.is_none());

        let err = ApiError::from_vfs(VfsError::not_found("home:/x"), true);
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert!(err.stack.is_some());
    }
}
