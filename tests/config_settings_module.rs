use codex_subagent::backend::BackendKind;
use codex_subagent::config::{ConfigError, Settings};
use codex_subagent::state::PathLayout;
use std::fs;
use std::time::Duration;
use tempfile::tempdir;

#[test]
fn missing_or_empty_config_yields_defaults() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("config.yaml");
    assert_eq!(Settings::from_path(&path).expect("missing"), Settings::default());

    fs::write(&path, "\n").expect("write");
    assert_eq!(Settings::from_path(&path).expect("empty"), Settings::default());

    let defaults = Settings::default();
    assert_eq!(defaults.lock_options().timeout, Duration::from_secs(5));
    assert_eq!(defaults.lock_options().retry_interval, Duration::from_millis(25));
    assert_eq!(defaults.poll_interval(), Duration::from_secs(2));
    assert_eq!(defaults.stale_launch_threshold(), Duration::from_secs(600));
    assert_eq!(defaults.launch_grace(), Duration::from_millis(400));
    assert_eq!(defaults.controller_pattern, "codex");
    assert_eq!(defaults.default_backend, BackendKind::Codex);
}

#[test]
fn partial_config_overrides_only_named_fields() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("config.yaml");
    fs::write(
        &path,
        "poll_interval_ms: 250\ndefault_backend: claude\ncontroller_pattern: claude\n",
    )
    .expect("write");
    let settings = Settings::from_path(&path).expect("parse");
    assert_eq!(settings.poll_interval(), Duration::from_millis(250));
    assert_eq!(settings.default_backend, BackendKind::Claude);
    assert_eq!(settings.controller_pattern, "claude");
    assert_eq!(settings.lock_timeout_ms, Settings::default().lock_timeout_ms);
}

#[test]
fn malformed_yaml_is_a_parse_error() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("config.yaml");
    fs::write(&path, "poll_interval_ms: [oops\n").expect("write");
    let err = Settings::from_path(&path).expect_err("invalid yaml");
    assert!(matches!(err, ConfigError::Parse { .. }));

    fs::write(&path, "default_backend: gemini\n").expect("write");
    assert!(matches!(
        Settings::from_path(&path).expect_err("unknown backend"),
        ConfigError::Parse { .. }
    ));
}

#[test]
fn load_validates_values() {
    let dir = tempdir().expect("tempdir");
    let layout = PathLayout::new(dir.path().join(".codex-subagent"));
    layout.ensure().expect("ensure");
    assert_eq!(Settings::load(&layout).expect("defaults"), Settings::default());

    fs::write(layout.config_file(), "lock_timeout_ms: 0\n").expect("write");
    let err = Settings::load(&layout).expect_err("zero timeout");
    assert!(matches!(err, ConfigError::Settings(_)));
    assert!(err.to_string().contains("lock_timeout_ms"));

    fs::write(layout.config_file(), "controller_pattern: '  '\n").expect("write");
    let err = Settings::load(&layout).expect_err("blank pattern");
    assert!(err.to_string().contains("controller_pattern"));
}
