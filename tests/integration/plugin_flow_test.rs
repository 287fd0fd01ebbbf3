// End-to-end tests of the plugin handlers with an in-memory reply sink

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use serde_json::json;
use tempfile::TempDir;

use aiimg::cache::naming::unique_file_name;
use aiimg::config;
use aiimg::host::{ImageRef, InboundMessage, MemorySink, Reply, ReplySink, Segment};
use aiimg::ImagePlugin;

use super::test_harness::{config_for, MockResponse, MockServer, RecordedRequest, JPEG_BYTES};

fn api_handler(req: &RecordedRequest) -> MockResponse {
    let host = req.header("host").unwrap_or_default().to_string();
    match (req.method.as_str(), req.path.as_str()) {
        ("POST", "/images/generations") => MockResponse::json(
            200,
            json!({ "data": [{ "url": format!("http://{}/files/gen.jpg", host) }] }),
        ),
        ("POST", "/async/images/edits") => MockResponse::json(200, json!({ "task_id": "t1" })),
        ("GET", "/task/t1") => MockResponse::json(
            200,
            json!({ "status": "success", "output": { "file_url": format!("http://{}/files/edit.jpg", host) } }),
        ),
        ("GET", path) if path.starts_with("/files/") => MockResponse::bytes(200, JPEG_BYTES),
        _ => MockResponse::text(404, "not found"),
    }
}

fn plugin(server: &MockServer, dir: &TempDir) -> ImagePlugin {
    ImagePlugin::new(config::shared(config_for(server, dir, "k1")))
        .unwrap()
        .with_edit_polling(Duration::from_millis(10), 5)
}

async fn wait_for_tasks(plugin: &ImagePlugin) {
    for _ in 0..200 {
        if plugin.tasks().active() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("background tasks did not finish");
}

#[tokio::test]
async fn test_duplicate_tool_call_is_not_generated_twice() {
    let server = MockServer::start(api_handler).await;
    let dir = TempDir::new().unwrap();
    let plugin = plugin(&server, &dir);
    let sink = MemorySink::new();
    let message = InboundMessage::text("u1", "draw a cat please").with_message_id("msg-1");

    let first = plugin.draw_tool(&message, "a cat", false, &sink).await;
    assert!(first.contains("do not call the tool again"));
    assert_eq!(sink.len(), 1);
    assert!(matches!(&sink.replies()[0], Reply::Image(_)));

    let second = plugin.draw_tool(&message, "a cat", false, &sink).await;
    assert!(second.contains("already generated"));
    assert_eq!(sink.len(), 1);
    assert_eq!(server.requests_to("/images/generations").len(), 1);
}

#[tokio::test]
async fn test_second_message_within_debounce_is_too_frequent() {
    let server = MockServer::start(api_handler).await;
    let dir = TempDir::new().unwrap();
    let plugin = plugin(&server, &dir);

    let first = InboundMessage::text("u2", "/aiimg a dog").with_message_id("m1");
    let replies = plugin.cmd_aiimg(&first, "a dog").await;
    assert!(matches!(&replies[0], Reply::Image(_)));

    let second = InboundMessage::text("u2", "/aiimg a dog again").with_message_id("m2");
    let replies = plugin.cmd_aiimg(&second, "a dog again").await;
    assert!(matches!(&replies[0], Reply::Text(t) if t.contains("Too many requests")));
    assert_eq!(server.requests_to("/images/generations").len(), 1);
}

#[tokio::test]
async fn test_aiimg_ratio_selects_size() {
    let server = MockServer::start(api_handler).await;
    let dir = TempDir::new().unwrap();
    let plugin = plugin(&server, &dir);
    let message = InboundMessage::text("u3", "/aiimg a city 16:9").with_message_id("m1");

    plugin.cmd_aiimg(&message, "a city 16:9").await;

    let calls = server.requests_to("/images/generations");
    let body: serde_json::Value = serde_json::from_slice(&calls[0].body).unwrap();
    assert_eq!(body["prompt"], "a city");
    assert_eq!(body["size"], "1024x576");
}

#[tokio::test]
async fn test_aiedit_runs_in_background_and_delivers_image() {
    let server = MockServer::start(api_handler).await;
    let dir = TempDir::new().unwrap();
    let plugin = plugin(&server, &dir);
    let sink = Arc::new(MemorySink::new());

    let encoded = base64::engine::general_purpose::STANDARD.encode(JPEG_BYTES);
    let message = InboundMessage::text("u4", "/aiedit make it blue style")
        .with_message_id("m1")
        .with_segment(Segment::Image(ImageRef::from_base64(format!("base64://{}", encoded))));

    let ack = plugin
        .cmd_aiedit(&message, "make it blue style", sink.clone() as Arc<dyn ReplySink>)
        .await;
    assert!(matches!(&ack[0], Reply::Text(t) if t.contains("Editing 1 image")));

    wait_for_tasks(&plugin).await;
    let replies = sink.replies();
    assert_eq!(replies.len(), 1);
    match &replies[0] {
        Reply::Image(path) => assert_eq!(std::fs::read(path).unwrap(), JPEG_BYTES),
        other => panic!("expected image, got {:?}", other),
    }

    let submit = &server.requests_to("/async/images/edits")[0];
    assert!(submit.body_text().contains("style"));
    assert!(submit.body_text().contains("make it blue"));
    assert!(!plugin.admission().is_in_flight("edit_u4"));
}

#[tokio::test]
async fn test_sweep_keeps_newest_within_count_cap() {
    let server = MockServer::start(api_handler).await;
    let dir = TempDir::new().unwrap();
    let plugin = plugin(&server, &dir);
    let image_dir = plugin.cache().dir().to_path_buf();

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs();
    // 205 files, one minute apart, the newest one hour old
    let mut names = Vec::new();
    for i in 0..205u64 {
        let name = unique_file_name(now - 3600 - (204 - i) * 60, "jpg");
        std::fs::write(image_dir.join(&name), [0u8; 16]).unwrap();
        names.push(name);
    }

    let report = plugin.sweep_now().await.unwrap();
    assert_eq!(report.deleted, 5);
    assert_eq!(report.remaining, 200);
    assert_eq!(report.freed_bytes, 5 * 16);
    for name in &names[..5] {
        assert!(!image_dir.join(name).exists(), "{} should be deleted", name);
    }
    assert!(image_dir.join(&names[5]).exists());

    // A second sweep finds nothing to do
    assert_eq!(plugin.sweep_now().await.unwrap().deleted, 0);
}

#[tokio::test]
async fn test_fresh_files_survive_age_sweep() {
    let server = MockServer::start(api_handler).await;
    let dir = TempDir::new().unwrap();
    let plugin = plugin(&server, &dir);
    let image_dir = plugin.cache().dir().to_path_buf();

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs();
    let expired = unique_file_name(now - 25 * 3600, "jpg");
    let fresh = unique_file_name(now - 60, "png");
    std::fs::write(image_dir.join(&expired), b"old").unwrap();
    std::fs::write(image_dir.join(&fresh), b"new").unwrap();
    std::fs::write(image_dir.join("notes.txt"), b"ignored").unwrap();

    let report = plugin.sweep_now().await.unwrap();
    assert_eq!(report.deleted, 1);
    assert!(!image_dir.join(&expired).exists());
    assert!(image_dir.join(&fresh).exists());
    assert!(image_dir.join("notes.txt").exists());
}

#[tokio::test]
async fn test_terminate_cancels_running_edit_and_releases_admission() {
    let server = MockServer::start(|req| match req.path.as_str() {
        "/async/images/edits" => MockResponse::json(200, json!({ "task_id": "t9" })),
        _ => MockResponse::json(200, json!({ "status": "pending" })),
    })
    .await;
    let dir = TempDir::new().unwrap();
    let plugin = ImagePlugin::new(config::shared(config_for(&server, &dir, "k1")))
        .unwrap()
        .with_edit_polling(Duration::from_millis(10), 10_000);
    let sink = Arc::new(MemorySink::new());

    let encoded = base64::engine::general_purpose::STANDARD.encode(JPEG_BYTES);
    let message = InboundMessage::text("u5", "/aiedit make it snowy")
        .with_message_id("m-edit")
        .with_segment(Segment::Image(ImageRef::from_base64(encoded)));
    plugin
        .cmd_aiedit(&message, "make it snowy", sink.clone() as Arc<dyn ReplySink>)
        .await;

    // Wait until the edit is polling the remote task
    for _ in 0..200 {
        if !server.requests_to("/task/t9").is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!server.requests_to("/task/t9").is_empty());
    assert_eq!(plugin.tasks().active(), 1);
    assert!(plugin.admission().is_in_flight("edit_u5"));
    assert!(plugin.admission().is_processed("m-edit"));

    plugin.terminate().await;

    assert_eq!(plugin.tasks().active(), 0);
    assert!(!plugin.admission().is_in_flight("edit_u5"));
    assert!(!plugin.admission().is_processed("m-edit"));
    assert!(sink.is_empty());
}
