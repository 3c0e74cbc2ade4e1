//! Integration tests for the rate-limited transport.

use std::io::Write;
use std::time::{Duration, Instant};

use flate2::write::GzEncoder;
use flate2::Compression;
use page_archiver::archiver::transport::DEFAULT_REQUEST_TIMEOUT;
use page_archiver::archiver::{FetchError, RateLimitedTransport};
use page_archiver::constants::ARCHIVAL_USER_AGENT;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn transport(spacing: Duration) -> RateLimitedTransport {
    RateLimitedTransport::new(spacing, DEFAULT_REQUEST_TIMEOUT).expect("Failed to build transport")
}

#[tokio::test]
async fn test_fetch_returns_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>Hi</body></html>"))
        .mount(&server)
        .await;

    let body = transport(Duration::from_millis(10))
        .fetch(&format!("{}/page", server.uri()), None)
        .await
        .expect("fetch should succeed");

    assert_eq!(body, b"<html><body>Hi</body></html>");
}

#[tokio::test]
async fn test_non_200_status_is_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/empty"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let transport = transport(Duration::from_millis(10));

    let err = transport
        .fetch(&format!("{}/missing", server.uri()), None)
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(404));
    assert!(err.to_string().contains("status code 404"));

    // Only 200 counts as success.
    let err = transport
        .fetch(&format!("{}/empty", server.uri()), None)
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Status { status: 204, .. }));
}

#[tokio::test]
async fn test_gzip_body_is_decompressed() {
    let server = MockServer::start().await;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(b"body { color: red; }").unwrap();
    let compressed = encoder.finish().unwrap();

    Mock::given(method("GET"))
        .and(path("/site.css"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-encoding", "gzip")
                .set_body_bytes(compressed),
        )
        .mount(&server)
        .await;

    let body = transport(Duration::from_millis(10))
        .fetch(&format!("{}/site.css", server.uri()), None)
        .await
        .unwrap();

    assert_eq!(body, b"body { color: red; }");
}

#[tokio::test]
async fn test_browser_headers_and_referer_are_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .and(header("user-agent", ARCHIVAL_USER_AGENT))
        .and(header("accept-language", "ja,en-US;q=0.9,en;q=0.8"))
        .and(header("cache-control", "no-cache"))
        .and(header("sec-fetch-mode", "navigate"))
        .and(header("referer", "https://www.google.com"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    transport(Duration::from_millis(10))
        .fetch(
            &format!("{}/page", server.uri()),
            Some("https://www.google.com"),
        )
        .await
        .expect("headers should match");
}

#[tokio::test]
async fn test_consecutive_requests_are_spaced() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let spacing = Duration::from_millis(300);
    let transport = transport(spacing);
    let url = format!("{}/a", server.uri());

    let start = Instant::now();
    transport.fetch(&url, None).await.unwrap();
    transport.fetch(&url, None).await.unwrap();

    assert!(
        start.elapsed() >= spacing,
        "two requests completed in {:?}",
        start.elapsed()
    );
}

#[tokio::test]
async fn test_concurrent_requests_share_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let spacing = Duration::from_millis(200);
    let first = transport(spacing);
    let second = first.clone();
    let third = first.clone();
    let url = format!("{}/a", server.uri());

    let start = Instant::now();
    let (a, b, c) = tokio::join!(
        first.fetch(&url, None),
        second.fetch(&url, None),
        third.fetch(&url, None)
    );
    a.unwrap();
    b.unwrap();
    c.unwrap();

    assert!(start.elapsed() >= spacing * 2);
}

#[tokio::test]
async fn test_final_url_follows_redirects() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/start"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("location", format!("{}/middle", server.uri())),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/middle"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/end"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/end"))
        .respond_with(ResponseTemplate::new(200).set_body_string("done"))
        .mount(&server)
        .await;

    let final_url = transport(Duration::from_millis(10))
        .final_url(&format!("{}/start", server.uri()), None)
        .await
        .unwrap();

    assert_eq!(final_url.as_str(), format!("{}/end", server.uri()));
}

#[tokio::test]
async fn test_cookies_are_reused() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/prime"))
        .respond_with(
            ResponseTemplate::new(200).insert_header("set-cookie", "session=abc; Path=/"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/check"))
        .and(header("cookie", "session=abc"))
        .respond_with(ResponseTemplate::new(200).set_body_string("welcome back"))
        .expect(1)
        .mount(&server)
        .await;

    let transport = transport(Duration::from_millis(10));
    transport
        .final_url(&format!("{}/prime", server.uri()), None)
        .await
        .unwrap();
    let body = transport
        .fetch(&format!("{}/check", server.uri()), None)
        .await
        .unwrap();

    assert_eq!(body, b"welcome back");
}
