//! Route handlers.
//!
//! Thin adapters between HTTP and the [`Gateway`](vfsgate_core::Gateway):
//! GET routes read their fields from the query string, POST routes from a
//! JSON body, and `writefile` from a multipart form.

use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::{Extension, Multipart, Query, State};
use axum::http::{HeaderMap, header};
use axum::response::Response;
use futures::{Stream, TryStreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use std::io;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tokio_util::io::{ReaderStream, StreamReader};
use vfsgate_core::{ByteRange, Capabilities, FileDescriptor, Session, VfsError, VfsOptions};

use crate::api::AppState;
use crate::error::ApiError;

type ApiResult<T> = Result<Json<T>, ApiError>;

// ============================================================================
// Request shapes
// ============================================================================

// Unknown fields are ignored, so clients may send `options` everywhere.

#[derive(Debug, Deserialize)]
pub struct PathQuery {
    pub path: String,
    /// JSON-encoded options.
    #[serde(default)]
    pub options: Option<String>,
}

impl PathQuery {
    fn options(&self) -> VfsOptions {
        self.options.as_deref().map(VfsOptions::parse).unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
pub struct PathBody {
    pub path: String,
    #[serde(default)]
    pub options: Value,
}

#[derive(Debug, Deserialize)]
pub struct TransferBody {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchBody {
    pub root: String,
    pub pattern: String,
}

#[derive(Debug, Deserialize)]
pub struct ArchiveBody {
    pub selection: Vec<String>,
    pub action: String,
}

// ============================================================================
// Metadata
// ============================================================================

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn capabilities(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Query(query): Query<PathQuery>,
) -> ApiResult<Capabilities> {
    let caps = state
        .gateway
        .capabilities(&session, &query.path)
        .await
        .map_err(|e| state.error(e))?;
    Ok(Json(caps))
}

pub async fn realpath(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Query(query): Query<PathQuery>,
) -> ApiResult<String> {
    let real = state
        .gateway
        .realpath(&session, &query.path)
        .await
        .map_err(|e| state.error(e))?;
    Ok(Json(real))
}

pub async fn exists(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Query(query): Query<PathQuery>,
) -> ApiResult<bool> {
    let found = state
        .gateway
        .exists(&session, &query.path)
        .await
        .map_err(|e| state.error(e))?;
    Ok(Json(found))
}

pub async fn stat(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Query(query): Query<PathQuery>,
) -> ApiResult<FileDescriptor> {
    let file = state
        .gateway
        .stat(&session, &query.path)
        .await
        .map_err(|e| state.error(e))?;
    Ok(Json(file))
}

pub async fn readdir(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Query(query): Query<PathQuery>,
) -> ApiResult<Vec<FileDescriptor>> {
    let entries = state
        .gateway
        .readdir(&session, &query.path)
        .await
        .map_err(|e| state.error(e))?;
    Ok(Json(entries))
}

// ============================================================================
// Content
// ============================================================================

pub async fn readfile(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Query(query): Query<PathQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(ByteRange::parse);

    let shaped = state
        .gateway
        .readfile(&session, &query.path, range, &query.options())
        .await
        .map_err(|e| state.error(e))?;

    let mut response = Response::builder().status(shaped.status);
    for (name, value) in &shaped.headers {
        response = response.header(*name, value.as_str());
    }
    response
        .body(Body::from_stream(ReaderStream::new(shaped.body)))
        .map_err(|e| ApiError::internal(e.to_string()))
}

/// Multipart fields: `path`, `upload` (file contents) and optional `options`.
///
/// The upload is spooled to a temporary file first so field order does not
/// matter; the spool is removed once the write finishes either way.
pub async fn writefile(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    mut multipart: Multipart,
) -> ApiResult<i64> {
    let mut path = None;
    let mut upload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.body_text()))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("path") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(e.body_text()))?;
                path = Some(text);
            }
            Some("upload") => {
                let spooled = spool(field.map_err(io::Error::other))
                    .await
                    .map_err(|e| state.error(VfsError::from(e)))?;
                upload = Some(spooled);
            }
            // `options` has no effect on writes; anything else is ignored.
            _ => {}
        }
    }

    let path = path.ok_or_else(|| ApiError::bad_request("missing 'path' field"))?;
    let upload = upload.ok_or_else(|| ApiError::bad_request("missing 'upload' field"))?;

    let file = tokio::fs::File::open(upload.path())
        .await
        .map_err(|e| state.error(VfsError::from(e)))?;
    let written = state.gateway.writefile(&session, &path, Box::new(file)).await;
    drop(upload);

    Ok(Json(written.map_err(|e| state.error(e))?))
}

/// Copy a byte stream into a fresh temporary file.
async fn spool<S>(stream: S) -> io::Result<NamedTempFile>
where
    S: Stream<Item = io::Result<Bytes>>,
{
    let spool = NamedTempFile::new()?;
    let mut file = tokio::fs::File::create(spool.path()).await?;
    let reader = StreamReader::new(stream);
    tokio::pin!(reader);
    let bytes = tokio::io::copy(&mut reader, &mut file).await?;
    file.flush().await?;
    tracing::debug!(bytes, spool = %spool.path().display(), "upload spooled");
    Ok(spool)
}

// ============================================================================
// Structure
// ============================================================================

pub async fn mkdir(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(body): Json<PathBody>,
) -> ApiResult<bool> {
    let options = VfsOptions::from_value(&body.options);
    let created = state
        .gateway
        .mkdir(&session, &body.path, &options)
        .await
        .map_err(|e| state.error(e))?;
    Ok(Json(created))
}

pub async fn unlink(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(body): Json<PathBody>,
) -> ApiResult<bool> {
    let removed = state
        .gateway
        .unlink(&session, &body.path)
        .await
        .map_err(|e| state.error(e))?;
    Ok(Json(removed))
}

pub async fn touch(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(body): Json<PathBody>,
) -> ApiResult<bool> {
    let touched = state
        .gateway
        .touch(&session, &body.path)
        .await
        .map_err(|e| state.error(e))?;
    Ok(Json(touched))
}

pub async fn copy(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(body): Json<TransferBody>,
) -> ApiResult<bool> {
    let copied = state
        .gateway
        .copy(&session, &body.from, &body.to)
        .await
        .map_err(|e| state.error(e))?;
    Ok(Json(copied))
}

pub async fn rename(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(body): Json<TransferBody>,
) -> ApiResult<bool> {
    let moved = state
        .gateway
        .rename(&session, &body.from, &body.to)
        .await
        .map_err(|e| state.error(e))?;
    Ok(Json(moved))
}

pub async fn search(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(body): Json<SearchBody>,
) -> ApiResult<Vec<FileDescriptor>> {
    let found = state
        .gateway
        .search(&session, &body.root, &body.pattern)
        .await
        .map_err(|e| state.error(e))?;
    Ok(Json(found))
}

pub async fn archive(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(body): Json<ArchiveBody>,
) -> ApiResult<Value> {
    state
        .gateway
        .archive(&session, &body.selection, &body.action)
        .await
        .map_err(|e| state.error(e))?;
    Ok(Json(json!({})))
}
