// Configuration parsing and derived values

use std::path::PathBuf;
use std::time::Duration;

use aiimg::config::{Config, KeyList};

#[test]
fn test_full_yaml_config() {
    let yaml = r#"
api_key:
  - " k1 "
  - ""
  - k2
edit_api_key: "e1, e2"
base_url: https://api.example.com/v1
edit_base_url: https://edit.example.com/v1
model: flux
size: 768x1024
timeout: 90
generation_timeout: 40
max_concurrent: 5
debounce_interval: 3
cache_max_age_hours: 48
cache_max_count: 500
cache_cleanup_interval_minutes: 15
data_dir: /var/lib/aiimg
outfit_schedule_file: /var/lib/scheduler/outfits.json
"#;
    let config = Config::from_yaml_with_env(yaml).unwrap();
    config.validate().unwrap();

    assert_eq!(config.generation_keys(), vec!["k1", "k2"]);
    assert_eq!(config.edit_keys(), vec!["e1", "e2"]);
    assert_eq!(config.edit_base_url(), "https://edit.example.com/v1");
    assert_eq!(config.http_timeout(), Duration::from_secs(90));
    assert_eq!(config.generation_timeout(), Duration::from_secs(40));
    assert_eq!(config.debounce_interval(), Duration::from_secs(3));
    assert_eq!(config.cleanup_interval(), Duration::from_secs(15 * 60));
    assert_eq!(config.image_dir(), PathBuf::from("/var/lib/aiimg/images"));
    assert_eq!(
        config.outfit_schedule_file,
        Some(PathBuf::from("/var/lib/scheduler/outfits.json"))
    );
}

#[test]
fn test_blank_edit_base_url_falls_back() {
    let config = Config::from_yaml_with_env("base_url: http://gen\nedit_base_url: \"  \"").unwrap();
    assert_eq!(config.edit_base_url(), "http://gen");
}

#[test]
fn test_key_list_forms_normalise_identically() {
    let csv = KeyList::from("a, b,,c");
    let list = KeyList::from(vec!["a".to_string(), " b".to_string(), "c".to_string()]);
    assert_eq!(csv.keys(), list.keys());
    assert!(KeyList::from(" , ").is_empty());
}

#[test]
fn test_wrong_value_type_is_an_error() {
    let err = Config::from_yaml_with_env("max_concurrent: lots").unwrap_err();
    assert!(err.contains("invalid type"));
}
