//! Router and shared handler state.

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use vfsgate_core::{Gateway, Session, VfsError};

use crate::auth;
use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::handlers;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    /// Sessions keyed by API token.
    pub users: Arc<HashMap<String, Session>>,
    pub development: bool,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(gateway: Arc<Gateway>, config: &ServerConfig) -> Self {
        let users = config
            .users
            .iter()
            .map(|user| (user.token.clone(), user.session()))
            .collect();
        Self {
            gateway,
            users: Arc::new(users),
            development: config.development,
            max_upload_bytes: config.max_upload_bytes,
        }
    }

    /// Render a gateway error for this server's mode.
    pub(crate) fn error(&self, err: VfsError) -> ApiError {
        ApiError::from_vfs(err, self.development)
    }
}

/// Build the application router.
pub fn create_router(state: AppState) -> Router {
    let vfs = Router::new()
        .route("/capabilities", get(handlers::capabilities))
        .route("/realpath", get(handlers::realpath))
        .route("/exists", get(handlers::exists))
        .route("/stat", get(handlers::stat))
        .route("/readdir", get(handlers::readdir))
        .route("/readfile", get(handlers::readfile))
        .route(
            "/writefile",
            post(handlers::writefile).layer(DefaultBodyLimit::max(state.max_upload_bytes)),
        )
        .route("/rename", post(handlers::rename))
        .route("/copy", post(handlers::copy))
        .route("/mkdir", post(handlers::mkdir))
        .route("/unlink", post(handlers::unlink))
        .route("/touch", post(handlers::touch))
        .route("/search", post(handlers::search))
        .route("/archive", post(handlers::archive))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_session,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/vfs", vfs)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
