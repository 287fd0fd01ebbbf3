// Integration tests for text-to-image generation against a mock API

use std::sync::Arc;

use base64::Engine;
use serde_json::json;
use tempfile::TempDir;

use aiimg::cache::ImageCache;
use aiimg::credentials::CredentialRotator;
use aiimg::generation::GenerationService;
use aiimg::PluginError;

use super::test_harness::{shared_for, MockResponse, MockServer, JPEG_BYTES};

fn service(server: &MockServer, dir: &TempDir, keys: &str) -> GenerationService {
    let config = shared_for(server, dir, keys);
    let rotator = Arc::new(CredentialRotator::new(config.clone()).unwrap());
    let cache = Arc::new(ImageCache::new(config.load().image_dir(), config.clone()).unwrap());
    GenerationService::new(config, rotator, cache)
}

/// Serves generations as a URL on the same server, and the image bytes behind it
fn url_handler(req: &super::test_harness::RecordedRequest) -> MockResponse {
    match (req.method.as_str(), req.path.as_str()) {
        ("POST", "/images/generations") => {
            let host = req.header("host").unwrap_or_default();
            MockResponse::json(
                200,
                json!({ "data": [{ "url": format!("http://{}/files/out.jpg", host) }] }),
            )
        }
        ("GET", "/files/out.jpg") => MockResponse::bytes(200, JPEG_BYTES),
        _ => MockResponse::text(404, "not found"),
    }
}

#[tokio::test]
async fn test_generation_downloads_url_result() {
    let server = MockServer::start(url_handler).await;
    let dir = TempDir::new().unwrap();
    let service = service(&server, &dir, "k1");

    let path = service.generate("a red fox", "").await.unwrap();

    assert_eq!(std::fs::read(&path).unwrap(), JPEG_BYTES);
    assert!(path.starts_with(dir.path().join("images")));

    let calls = server.requests_to("/images/generations");
    assert_eq!(calls.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&calls[0].body).unwrap();
    assert_eq!(body["prompt"], "a red fox");
    assert_eq!(body["model"], "z-image-turbo");
    assert_eq!(body["size"], "1024x1024");
    assert_eq!(body["num_inference_steps"], 9);
    assert_eq!(calls[0].header("authorization"), Some("Bearer k1"));
}

#[tokio::test]
async fn test_generation_saves_inline_base64() {
    let encoded = base64::engine::general_purpose::STANDARD.encode(JPEG_BYTES);
    let server = MockServer::start(move |_req| {
        MockResponse::json(200, json!({ "data": [{ "b64_json": encoded }] }))
    })
    .await;
    let dir = TempDir::new().unwrap();
    let service = service(&server, &dir, "k1");

    let path = service.generate("a lighthouse", "768x1024").await.unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), JPEG_BYTES);

    let body: serde_json::Value = serde_json::from_slice(&server.requests()[0].body).unwrap();
    assert_eq!(body["size"], "768x1024");
}

#[tokio::test]
async fn test_generation_without_keys_makes_no_request() {
    let server = MockServer::start(url_handler).await;
    let dir = TempDir::new().unwrap();
    let service = service(&server, &dir, "");

    let err = service.generate("anything", "").await.unwrap_err();
    assert!(matches!(err, PluginError::Configuration(_)));
    assert!(server.requests().is_empty());
}

#[tokio::test]
async fn test_keys_rotate_round_robin() {
    let server = MockServer::start(url_handler).await;
    let dir = TempDir::new().unwrap();
    let service = service(&server, &dir, "k1, k2");

    for _ in 0..3 {
        service.generate("a boat", "").await.unwrap();
    }

    let keys: Vec<String> = server
        .requests_to("/images/generations")
        .iter()
        .filter_map(|r| r.header("authorization").map(str::to_string))
        .collect();
    assert_eq!(keys, vec!["Bearer k1", "Bearer k2", "Bearer k1"]);
}

#[tokio::test]
async fn test_status_errors_are_classified() {
    let server = MockServer::start(|req| {
        if req.header("authorization") == Some("Bearer bad") {
            MockResponse::text(401, "invalid api key")
        } else {
            MockResponse::text(429, "quota exceeded")
        }
    })
    .await;
    let dir = TempDir::new().unwrap();
    let service = service(&server, &dir, "bad,limited");

    let first = service.generate("x", "").await.unwrap_err();
    assert!(matches!(first, PluginError::Auth(_)));
    assert_eq!(first.user_message(), "API key is invalid or expired");

    let second = service.generate("x", "").await.unwrap_err();
    assert!(matches!(second, PluginError::RateLimited(_)));
}

#[tokio::test]
async fn test_empty_data_is_no_image_data() {
    let server = MockServer::start(|_req| MockResponse::json(200, json!({ "data": [{}] }))).await;
    let dir = TempDir::new().unwrap();
    let service = service(&server, &dir, "k1");

    let err = service.generate("x", "").await.unwrap_err();
    assert!(matches!(err, PluginError::NoImageData));
}

#[tokio::test]
async fn test_slot_is_released_after_failure() {
    let server = MockServer::start(|_req| MockResponse::text(500, "boom")).await;
    let dir = TempDir::new().unwrap();
    let service = service(&server, &dir, "k1");
    let before = service.available_slots();

    let err = service.generate("x", "").await.unwrap_err();
    assert!(matches!(err, PluginError::Api { status: 500, .. }));
    assert_eq!(service.available_slots(), before);
}
