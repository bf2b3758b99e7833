use std::io::Write;
use std::time::Duration;

use danmu_core::{Config, DanmuClient};

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_from_yaml_file() {
    let file = write_config(
        r#"
client:
  room: "6"
  viewer_id: 42
  device_id: "buvid-abc"
  host: "hw-sh-live-comet-01.chat.bilibili.com"
  heartbeat_interval_secs: 20
  retry_backoff_ms: 500
  cookies:
    buvid3: "xyz"
logging:
  level: "debug"
  format: "json"
"#,
    );

    let config = Config::from_file(file.path().to_str().unwrap()).unwrap();
    assert_eq!(config.client.room, "6");
    assert_eq!(config.client.viewer_id, 42);
    assert_eq!(config.client.device_id, "buvid-abc");
    assert_eq!(config.client.host.as_deref(), Some("hw-sh-live-comet-01.chat.bilibili.com"));
    assert_eq!(config.client.cookies.get("buvid3").map(String::as_str), Some("xyz"));
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, "json");
    // unset keys keep their defaults
    assert_eq!(config.client.reconnect_delay_ms, 3);
    assert!(config.validate().is_ok());

    let options = config.client.options();
    assert_eq!(options.heartbeat_interval, Duration::from_secs(20));
}

#[test]
fn test_missing_file_uses_defaults() {
    let config = Config::from_file("/nonexistent/danmu.yaml").unwrap();
    assert_eq!(config.client.heartbeat_interval_secs, 30);
    assert_eq!(config.client.retry_backoff_ms, 2000);
    assert_eq!(config.logging.format, "pretty");
}

#[test]
fn test_client_from_config() {
    let file = write_config("client:\n  room: \"21452505\"\n  host: \"x.example\"\n");
    let config = Config::from_file(file.path().to_str().unwrap()).unwrap();

    let client = DanmuClient::from_config(&config.client);
    assert!(!client.is_stopped());
    assert!(client.session().is_none());
    let debug = format!("{client:?}");
    assert!(debug.contains("21452505"));
    assert!(debug.contains("x.example"));
}
