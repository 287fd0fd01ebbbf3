// Integration tests for configuration hot reload
// Keys added by a reload become usable without rebuilding the plugin

use std::sync::Arc;
use std::time::Duration;

use tempfile::NamedTempFile;
use tokio::sync::oneshot;

use aiimg::config::{self, Config};
use aiimg::credentials::{CredentialRotator, Purpose};
use aiimg::reload::ReloadManager;
use aiimg::PluginError;

fn write_config(file: &mut NamedTempFile, yaml: &str) {
    std::fs::write(file.path(), yaml).unwrap();
}

#[test]
fn test_reload_fills_empty_key_pool() {
    let mut file = NamedTempFile::new().unwrap();
    write_config(&mut file, "base_url: http://127.0.0.1:9\n");

    let shared = config::shared(Config::from_file(file.path()).unwrap());
    let rotator = CredentialRotator::new(shared.clone()).unwrap();
    assert!(matches!(
        rotator.get_client(Purpose::Generation),
        Err(PluginError::Configuration(_))
    ));

    write_config(&mut file, "base_url: http://127.0.0.1:9\napi_key: \"late-key\"\n");
    let manager = ReloadManager::new(file.path().to_path_buf(), shared.clone());
    assert_eq!(manager.apply_reload().unwrap(), 1);

    let (client, key) = rotator.get_client(Purpose::Generation).unwrap();
    assert_eq!(key, "late-key");
    assert_eq!(client.api_key(), "late-key");
}

#[test]
fn test_reload_with_new_base_url_rebuilds_client() {
    let mut file = NamedTempFile::new().unwrap();
    write_config(&mut file, "base_url: http://old.invalid\napi_key: k1\n");

    let shared = config::shared(Config::from_file(file.path()).unwrap());
    let rotator = CredentialRotator::new(shared.clone()).unwrap();
    let (before, _) = rotator.get_client(Purpose::Generation).unwrap();
    assert_eq!(before.base_url(), "http://old.invalid");

    write_config(&mut file, "base_url: http://new.invalid\napi_key: k1\n");
    ReloadManager::new(file.path().to_path_buf(), shared)
        .apply_reload()
        .unwrap();

    let (after, _) = rotator.get_client(Purpose::Generation).unwrap();
    assert_eq!(after.base_url(), "http://new.invalid");
}

#[tokio::test]
async fn test_watch_task_stops_on_shutdown() {
    let mut file = NamedTempFile::new().unwrap();
    write_config(&mut file, "");
    let manager = Arc::new(ReloadManager::new(
        file.path().to_path_buf(),
        config::shared(Config::default()),
    ));

    let (tx, rx) = oneshot::channel();
    let handle = Arc::clone(&manager).spawn_watch_task(Duration::from_millis(10), rx);
    tokio::time::sleep(Duration::from_millis(30)).await;
    tx.send(()).unwrap();

    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("watch task did not stop")
        .unwrap();
    assert_eq!(manager.generation(), 0);
}
