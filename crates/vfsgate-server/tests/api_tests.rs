//! HTTP API tests.
//!
//! Drive the router directly with `oneshot`; no listener is bound.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;
use vfsgate_core::vfs::MEMORY_ADAPTER;
use vfsgate_core::{Gateway, MountAttributes, Mountpoint, SegmentTable, VfsConfig};
use vfsgate_server::{AppState, ServerConfig, UserConfig, create_router};

const TOKEN: &str = "amy-token";
const BOUNDARY: &str = "vfsgate-test-boundary";

// ============================================================================
// Shared test setup
// ============================================================================

struct TestApp {
    router: Router,
    dir: TempDir,
}

fn mount(name: &str, root: &str, adapter: Option<&str>, read_only: bool) -> Mountpoint {
    Mountpoint {
        name: name.into(),
        label: None,
        adapter: adapter.map(Into::into),
        attributes: MountAttributes {
            root: Some(root.into()),
            read_only,
            ..Default::default()
        },
    }
}

fn test_app_with(development: bool) -> TestApp {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("app/dist")).unwrap();
    std::fs::write(dir.path().join("app/dist/index.html"), b"<html></html>").unwrap();
    std::fs::create_dir_all(dir.path().join("vfs/amy")).unwrap();

    let vfs = VfsConfig {
        mountpoints: vec![
            mount("home", "{vfs}/{username}", None, false),
            mount("dist", "{root}/dist", None, true),
            mount("scratch", "{vfs}/{username}", Some(MEMORY_ADAPTER), false),
        ],
        ..Default::default()
    };
    let config = ServerConfig {
        development,
        users: vec![UserConfig {
            token: TOKEN.into(),
            username: "amy".into(),
            groups: vec!["users".into()],
        }],
        vfs,
        ..Default::default()
    };

    let segments = SegmentTable::new(dir.path().join("app"), dir.path().join("vfs"));
    let gateway = Arc::new(Gateway::with_segments(&config.vfs, segments).unwrap());
    let router = create_router(AppState::new(gateway, &config));
    TestApp { router, dir }
}

fn test_app() -> TestApp {
    test_app_with(false)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn upload(path: &str, contents: &str) -> Request<Body> {
    let body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"upload\"; filename=\"blob\"\r\n\
         Content-Type: application/octet-stream\r\n\r\n\
         {contents}\r\n\
         --{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"path\"\r\n\r\n\
         {path}\r\n\
         --{BOUNDARY}--\r\n"
    );
    Request::builder()
        .method("POST")
        .uri("/vfs/writefile")
        .header("x-api-key", TOKEN)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, bytes.to_vec())
}

async fn send_json(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn test_health_is_public() {
    let app = test_app();
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send_json(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_missing_token_rejected() {
    let app = test_app();
    let request = Request::builder()
        .uri("/vfs/readdir?path=home:/")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send_json(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");
}

#[tokio::test]
async fn test_unknown_token_rejected() {
    let app = test_app();
    let request = Request::builder()
        .uri("/vfs/exists?path=home:/")
        .header(header::AUTHORIZATION, "Bearer nope")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ============================================================================
// Content
// ============================================================================

#[tokio::test]
async fn test_upload_then_read() {
    let app = test_app();

    let (status, written) = send_json(&app, upload("home:/docs/a.txt", "hello world")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(written, json!(11));
    assert!(app.dir.path().join("vfs/amy/docs/a.txt").exists());

    let response = app
        .router
        .clone()
        .oneshot(get("/vfs/readfile?path=home:/docs/a.txt"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"hello world");

    let (status, file) = send_json(&app, get("/vfs/stat?path=home:/docs/a.txt")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(file["filename"], "a.txt");
    assert_eq!(file["size"], 11);
    assert_eq!(file["isFile"], true);
}

#[tokio::test]
async fn test_ranged_read() {
    let app = test_app();
    send(&app, upload("home:/a.txt", "hello world")).await;

    let mut request = get("/vfs/readfile?path=home:/a.txt");
    request
        .headers_mut()
        .insert(header::RANGE, "bytes=6-".parse().unwrap());
    let response = app.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 6-10/11");
    assert_eq!(response.headers()[header::ACCEPT_RANGES], "bytes");
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"world");
}

#[tokio::test]
async fn test_download_disposition() {
    let app = test_app();
    send(&app, upload("home:/my report.txt", "x")).await;

    let response = app
        .router
        .clone()
        .oneshot(get(
            "/vfs/readfile?path=home:/my%20report.txt&options=%7B%22download%22%3Atrue%7D",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename*=utf-8''my%20report.txt"
    );
}

#[tokio::test]
async fn test_upload_missing_path() {
    let app = test_app();
    let body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"upload\"; filename=\"blob\"\r\n\r\n\
         data\r\n\
         --{BOUNDARY}--\r\n"
    );
    let request = Request::builder()
        .method("POST")
        .uri("/vfs/writefile")
        .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();
    let (status, body) = send_json(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "missing 'path' field");
}

// ============================================================================
// Errors
// ============================================================================

#[tokio::test]
async fn test_read_only_mount() {
    let app = test_app();
    let (status, body) = send_json(&app, upload("dist:/index.html", "pwned")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Mountpoint 'dist' is read-only");
    assert!(body.get("stack").is_none());

    let index = std::fs::read(app.dir.path().join("app/dist/index.html")).unwrap();
    assert_eq!(index, b"<html></html>");
}

#[tokio::test]
async fn test_unknown_mount() {
    let app = test_app();
    let (status, body) = send_json(&app, get("/vfs/stat?path=nope:/x")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Mountpoint not found for 'nope:/x'");
}

#[tokio::test]
async fn test_stack_only_in_development() {
    let app = test_app();
    let (status, body) = send_json(&app, get("/vfs/stat?path=home:/missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.get("stack").is_none());

    let app = test_app_with(true);
    let (status, body) = send_json(&app, get("/vfs/stat?path=home:/missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
    assert!(body["stack"].is_string());
}

// ============================================================================
// Structure
// ============================================================================

#[tokio::test]
async fn test_mkdir_ensure_options() {
    let app = test_app();

    let request = post_json("/vfs/mkdir", json!({ "path": "home:/new" }));
    let (status, body) = send_json(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(true));

    let (status, _) = send(&app, post_json("/vfs/mkdir", json!({ "path": "home:/new" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Options may arrive as a JSON string.
    let request = post_json(
        "/vfs/mkdir",
        json!({ "path": "home:/new", "options": "{\"ensure\":true}" }),
    );
    let (status, body) = send_json(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(true));

    let request = post_json(
        "/vfs/mkdir",
        json!({ "path": "home:/new", "options": { "ensure": true } }),
    );
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_touch_readdir_unlink() {
    let app = test_app();
    send(&app, post_json("/vfs/touch", json!({ "path": "home:/b.txt" }))).await;
    send(&app, post_json("/vfs/touch", json!({ "path": "home:/a.txt" }))).await;

    let (status, entries) = send_json(&app, get("/vfs/readdir?path=home:/")).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<_> = entries
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["filename"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, ["a.txt", "b.txt"]);

    let request = post_json("/vfs/unlink", json!({ "path": "home:/a.txt" }));
    let (status, body) = send_json(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(true));

    let (_, found) = send_json(&app, get("/vfs/exists?path=home:/a.txt")).await;
    assert_eq!(found, json!(false));
}

#[tokio::test]
async fn test_cross_mount_rename() {
    let app = test_app();
    send(&app, upload("home:/move.txt", "moving")).await;

    let request = post_json(
        "/vfs/rename",
        json!({ "from": "home:/move.txt", "to": "scratch:/moved.txt" }),
    );
    let (status, body) = send_json(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(true));

    let (_, found) = send_json(&app, get("/vfs/exists?path=home:/move.txt")).await;
    assert_eq!(found, json!(false));

    let (status, body) = send(&app, get("/vfs/readfile?path=scratch:/moved.txt")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"moving");
}

#[tokio::test]
async fn test_copy_out_of_read_only() {
    let app = test_app();
    let request = post_json(
        "/vfs/copy",
        json!({ "from": "dist:/index.html", "to": "home:/index.html" }),
    );
    let (status, body) = send_json(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(true));
    assert!(app.dir.path().join("vfs/amy/index.html").exists());
}

#[tokio::test]
async fn test_search() {
    let app = test_app();
    send(&app, upload("home:/docs/notes.txt", "n")).await;
    send(&app, upload("home:/docs/image.png", "i")).await;

    let request = post_json("/vfs/search", json!({ "root": "home:/", "pattern": "*.txt" }));
    let (status, found) = send_json(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    let found = found.as_array().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["path"], "home:/docs/notes.txt");
}

#[tokio::test]
async fn test_archive_actions() {
    let app = test_app();
    send(&app, upload("home:/bundle/a.txt", "a")).await;

    let request = post_json(
        "/vfs/archive",
        json!({ "selection": ["home:/bundle"], "action": "compress" }),
    );
    let (status, body) = send_json(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({}));
    assert!(app.dir.path().join("vfs/amy/bundle.zip").exists());

    let request = post_json(
        "/vfs/archive",
        json!({ "selection": ["home:/bundle"], "action": "explode" }),
    );
    let (status, body) = send_json(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Unknown archive action: explode");
}

#[tokio::test]
async fn test_capabilities_and_realpath() {
    let app = test_app();
    let (status, caps) = send_json(&app, get("/vfs/capabilities?path=home:/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(caps, json!({ "sort": false, "pagination": false }));

    let (status, real) = send_json(&app, get("/vfs/realpath?path=scratch:/x")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(real.as_str().unwrap().starts_with("memory:"));
}
