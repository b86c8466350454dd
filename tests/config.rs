//! Configuration Tests
//!
//! Loading `DispatcherConfig` from files and building apps from it.

use papa_events::{DispatcherConfig, EventApp, EventError};
use std::io::Write;
use tokio_test::{assert_err, assert_ok};

fn config_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .unwrap();
    write!(file, "{contents}").unwrap();
    file
}

#[test]
fn config_has_expected_defaults() {
    let config = DispatcherConfig::default();

    assert_eq!(config.max_jobs, 20);
    assert_eq!(config.retries, 0);
    assert_eq!(config.retry_delay_ms, 1000);
    assert_eq!(config.handler_timeout_ms, None);
    assert_eq!(config.drain_timeout_ms, 30_000);
    assert_eq!(config.outcome_buffer, 1024);
    assert_eq!(config.dead_letter_capacity, 1000);
}

#[test]
fn config_loads_from_file() {
    let file = config_file(
        r#"
max_jobs = 8
retries = 2
handler_timeout_ms = 1500
"#,
    );

    let config = assert_ok!(DispatcherConfig::load(Some(file.path())));
    assert_eq!(config.max_jobs, 8);
    assert_eq!(config.retries, 2);
    assert_eq!(config.handler_timeout_ms, Some(1500));
    // Unset keys keep their defaults
    assert_eq!(config.drain_timeout_ms, 30_000);
}

#[test]
fn config_rejects_invalid_values() {
    let file = config_file("outcome_buffer = 0\n");
    let err = assert_err!(DispatcherConfig::load(Some(file.path())));
    assert!(matches!(err, EventError::Configuration(_)));

    let file = config_file("max_jobs = \"lots\"\n");
    assert_err!(DispatcherConfig::load(Some(file.path())));
}

#[test]
fn app_uses_loaded_config() {
    let file = config_file("max_jobs = 3\nretries = 1\n");
    let config = assert_ok!(DispatcherConfig::load(Some(file.path())));

    let app = assert_ok!(EventApp::with_config(config.clone()));
    assert_eq!(app.config(), &config);
}
