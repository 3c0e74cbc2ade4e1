//! Integration tests for web routes.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use page_archiver::archiver::Archiver;
use page_archiver::config::Config;
use page_archiver::db::{insert_archive_entry, Database, NewArchiveEntry};
use page_archiver::web::{create_app, AppState};
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct TestApp {
    app: Router,
    db: Database,
    config: Config,
    _temp_dir: TempDir,
}

async fn create_test_app() -> TestApp {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = Config {
        data_dir: temp_dir.path().join("data"),
        database_path: temp_dir.path().join("test.sqlite"),
        ..Config::for_testing()
    };
    let db = Database::new(&config.database_path)
        .await
        .expect("Failed to create database");
    let archiver = Archiver::new(&config).expect("Failed to create archiver");
    archiver.ensure_storage_dirs().await.unwrap();

    let state = AppState {
        db: db.clone(),
        archiver: Arc::new(archiver),
        config: Arc::new(config.clone()),
    };

    TestApp {
        app: create_app(state),
        db,
        config,
        _temp_dir: temp_dir,
    }
}

async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_text(response: Response) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}

async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let test = create_test_app().await;
    let response = send(&test.app, get("/healthz")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "OK");
}

#[tokio::test]
async fn test_create_archive_rejects_empty_url() {
    let test = create_test_app().await;
    let response = send(&test.app, post_json("/api/archive", r#"{"url": "   "}"#)).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(response).await, "URL cannot be empty");
}

#[tokio::test]
async fn test_create_archive_rejects_bad_json() {
    let test = create_test_app().await;

    let response = send(&test.app, post_json("/api/archive", "{not json")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(response).await, "Cannot parse JSON payload");

    let response = send(&test.app, post_json("/api/archive", r#"{"link": "x"}"#)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_archive_rejects_relative_url() {
    let test = create_test_app().await;
    let response = send(&test.app, post_json("/api/archive", r#"{"url": "/page"}"#)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_and_retrieve_archive() {
    let test = create_test_app().await;
    let server = MockServer::start().await;
    let page = "<html><head><title>Hello</title></head><body>Hi</body></html>";
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page))
        .mount(&server)
        .await;

    let url = format!("{}/page", server.uri());
    let response = send(
        &test.app,
        post_json("/api/archive", &serde_json::json!({ "url": url }).to_string()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let entry = body_json(response).await;
    let id = entry["id"].as_str().unwrap().to_string();
    assert_eq!(entry["url"], url.as_str());
    assert_eq!(entry["title"], "Hello");
    assert!(entry["screenshot_path"].is_null());

    let response = send(&test.app, get(&format!("/api/archive/{id}"))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["id"], id.as_str());

    let response = send(&test.app, get(&format!("/api/archive/{id}/content"))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/html"
    );
    assert_eq!(body_text(response).await, page);

    let response = send(&test.app, get(&format!("/api/archive/{id}/screenshot"))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_text(response).await, "Screenshot not available");

    let response = send(&test.app, get("/api/archive")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let list = body_json(response).await;
    assert_eq!(list["total"], 1);
    assert_eq!(list["data"][0]["id"], id.as_str());
}

#[tokio::test]
async fn test_create_archive_upstream_failure() {
    let test = create_test_app().await;
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let body = serde_json::json!({ "url": format!("{}/gone", server.uri()) }).to_string();
    let response = send(&test.app, post_json("/api/archive", &body)).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let text = body_text(response).await;
    assert!(text.starts_with("Failed to archive URL:"));
    assert!(text.contains("404"));

    let response = send(&test.app, get("/api/archive")).await;
    assert_eq!(body_json(response).await["total"], 0);
}

#[tokio::test]
async fn test_unknown_archive_is_404() {
    let test = create_test_app().await;

    for uri in [
        "/api/archive/missing",
        "/api/archive/missing/content",
        "/api/archive/missing/screenshot",
    ] {
        let response = send(&test.app, get(uri)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
    }
}

#[tokio::test]
async fn test_missing_files_are_404() {
    let test = create_test_app().await;
    let data_dir = test.config.data_dir.clone();
    insert_archive_entry(
        test.db.pool(),
        &NewArchiveEntry {
            id: "e1".to_string(),
            url: "https://example.com/".to_string(),
            title: String::new(),
            storage_path: data_dir.join("raw/e1.html").display().to_string(),
            screenshot_path: Some(data_dir.join("screenshots/e1.jpg").display().to_string()),
            archived_at: "2024-01-01T00:00:00.000000Z".to_string(),
        },
    )
    .await
    .unwrap();

    let response = send(&test.app, get("/api/archive/e1/content")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(&test.app, get("/api/archive/e1/screenshot")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_text(response).await, "Screenshot not available");

    std::fs::write(data_dir.join("screenshots/e1.jpg"), [0xFF, 0xD8, 0xFF]).unwrap();
    let response = send(&test.app, get("/api/archive/e1/screenshot")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "image/jpeg"
    );
    assert_eq!(body_bytes(response).await, vec![0xFF, 0xD8, 0xFF]);
}

#[tokio::test]
async fn test_content_keeps_legacy_encoding() {
    let test = create_test_app().await;
    let html_path = test.config.data_dir.join("raw/sj.html");
    // Shift_JIS page declaring its own charset.
    let mut page = b"<html><head><meta charset=\"Shift_JIS\"></head><body>".to_vec();
    page.extend_from_slice(b"\x82\xb1\x82\xf1\x82\xc9\x82\xbf\x82\xcd</body></html>");
    std::fs::write(&html_path, &page).unwrap();

    insert_archive_entry(
        test.db.pool(),
        &NewArchiveEntry {
            id: "sj".to_string(),
            url: "https://example.jp/".to_string(),
            title: String::new(),
            storage_path: html_path.display().to_string(),
            screenshot_path: None,
            archived_at: "2024-01-01T00:00:00.000000Z".to_string(),
        },
    )
    .await
    .unwrap();

    let response = send(&test.app, get("/api/archive/sj/content")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get(header::CONTENT_TYPE).unwrap();
    assert_eq!(content_type, "text/html");
    assert!(!content_type.to_str().unwrap().contains("charset"));
    assert_eq!(body_bytes(response).await, page);
}

#[tokio::test]
async fn test_data_directory_is_served() {
    let test = create_test_app().await;
    std::fs::write(
        test.config.data_dir.join("assets/abc_12345678.css"),
        "body{}",
    )
    .unwrap();

    let response = send(&test.app, get("/data/assets/abc_12345678.css")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "body{}");
}
