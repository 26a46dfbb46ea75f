// Integration tests for layered configuration loading

use std::io::Write;

use clap::Parser;
use keylease::config::{Cli, Configuration};
use keylease::startup::LogRotation;
use tempfile::NamedTempFile;

fn write_config(yaml: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".yml")
        .tempfile()
        .unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file
}

fn load(args: &[&str]) -> Configuration {
    let mut argv = vec!["keylease"];
    argv.extend_from_slice(args);
    Configuration::load(&Cli::parse_from(argv)).unwrap()
}

#[test]
fn test_endpoint_list_from_file() {
    let file = write_config(
        r#"
etcd:
  config:
    enabled: true
    endpoints:
      - http://10.0.0.1:2379
      - http://10.0.0.2:2379
    default-ttl-secs: 12
"#,
    );
    let path = file.path().to_str().unwrap();

    let lock = load(&["--config", path]).lock_config().unwrap();
    assert!(lock.enabled);
    assert_eq!(
        lock.endpoints,
        vec!["http://10.0.0.1:2379", "http://10.0.0.2:2379"]
    );
    assert_eq!(lock.default_ttl_secs, 12);
    assert_eq!(lock.acquire_timeout_ms, 1000);
    assert_eq!(lock.connect_timeout_ms, 5000);
}

#[test]
fn test_comma_separated_endpoints_from_file() {
    let file = write_config(
        r#"
etcd:
  config:
    enabled: true
    endpoints: "http://a:2379,http://b:2379"
"#,
    );
    let path = file.path().to_str().unwrap();

    let lock = load(&["--config", path]).lock_config().unwrap();
    assert_eq!(lock.endpoints, vec!["http://a:2379", "http://b:2379"]);
}

#[test]
fn test_flags_override_file() {
    let file = write_config(
        r#"
etcd:
  config:
    enabled: false
    endpoints: "http://file:2379"
    acquire-timeout-ms: 1000
"#,
    );
    let path = file.path().to_str().unwrap();

    let lock = load(&[
        "--config",
        path,
        "--endpoints",
        "http://flag:2379",
        "--acquire-timeout-ms",
        "300",
    ])
    .lock_config()
    .unwrap();
    assert!(lock.enabled);
    assert_eq!(lock.endpoints, vec!["http://flag:2379"]);
    assert_eq!(lock.acquire_timeout_ms, 300);
}

#[test]
fn test_missing_section_disables_lock() {
    let file = write_config("keylease:\n  logs:\n    level: debug\n");
    let path = file.path().to_str().unwrap();

    let configuration = load(&["--config", path]);
    let lock = configuration.lock_config().unwrap();
    assert!(!lock.enabled);
    assert!(lock.endpoints.is_empty());
    assert_eq!(lock.default_ttl_secs, 30);

    let logging = configuration.logging_config().unwrap();
    assert_eq!(logging.console_level, tracing::Level::DEBUG);
}

#[test]
fn test_log_rotation_from_file() {
    let file = write_config("keylease:\n  logs:\n    rotation: hourly\n");
    let path = file.path().to_str().unwrap();

    let logging = load(&["--config", path]).logging_config().unwrap();
    assert_eq!(logging.rotation, LogRotation::Hourly);

    let file = write_config("keylease:\n  logs:\n    rotation: weekly\n");
    let path = file.path().to_str().unwrap();
    assert!(load(&["--config", path]).logging_config().is_err());
}

#[test]
fn test_invalid_section_is_reported() {
    let file = write_config(
        r#"
etcd:
  config:
    default-ttl-secs: "thirty"
"#,
    );
    let path = file.path().to_str().unwrap();

    assert!(load(&["--config", path]).lock_config().is_err());
}
