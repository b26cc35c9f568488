// tests/config_tests.rs

use gemini_relay::config::{load_config, validate, AppConfig};
use gemini_relay::error::AppError;
use rstest::rstest;
use serial_test::serial;
use std::path::Path;

const ENV_API_KEYS: &str = "GEMINI_RELAY_API_KEYS";
const ENV_TARGET_URL: &str = "GEMINI_RELAY_TARGET_URL";

fn clear_env() {
    std::env::remove_var(ENV_API_KEYS);
    std::env::remove_var(ENV_TARGET_URL);
    std::env::remove_var("GEMINI_RELAY_STATE_PATH");
}

fn write_config(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, contents).unwrap();
    (dir, path)
}

#[test]
#[serial]
fn test_yaml_with_defaults_applied() {
    clear_env();
    let (_dir, path) = write_config(
        r"
api_keys:
  - alpha-key
  - beta-key
",
    );
    let config = load_config(&path).unwrap();

    assert_eq!(config.api_keys, vec!["alpha-key", "beta-key"]);
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.rate_limit.min_interval_ms, 4000);
    assert_eq!(config.rate_limit.daily_cap, 1500);
    assert_eq!(config.retry.max_attempts, 3);
    assert_eq!(config.history_window, 10);
    assert_eq!(config.models[0], "gemini-2.0-flash");
    assert!(config.state_path.is_none());
}

#[test]
#[serial]
fn test_yaml_overrides_defaults() {
    clear_env();
    let (_dir, path) = write_config(
        r"
api_keys: [only-key]
server:
  port: 9090
rate_limit:
  min_interval_ms: 1000
  daily_cap: 50
retry:
  max_attempts: 5
  backoff_base_ms: 100
",
    );
    let config = load_config(&path).unwrap();

    assert_eq!(config.server.port, 9090);
    assert_eq!(config.rate_limit.daily_cap, 50);
    assert_eq!(config.retry.max_attempts, 5);
}

#[test]
#[serial]
fn test_env_api_keys_override_file() {
    clear_env();
    let (_dir, path) = write_config("api_keys: [file-key]\n");
    std::env::set_var(ENV_API_KEYS, "env-key-1, env-key-2");

    let config = load_config(&path).unwrap();
    std::env::remove_var(ENV_API_KEYS);

    assert_eq!(config.api_keys, vec!["env-key-1", "env-key-2"]);
}

#[test]
#[serial]
fn test_missing_file_with_env_keys_uses_defaults() {
    clear_env();
    std::env::set_var(ENV_API_KEYS, "env-only-key");

    let config = load_config(Path::new("/definitely/not/there.yaml")).unwrap();
    std::env::remove_var(ENV_API_KEYS);

    assert_eq!(config.api_keys, vec!["env-only-key"]);
    assert_eq!(
        config.target_url,
        "https://generativelanguage.googleapis.com"
    );
}

#[test]
#[serial]
fn test_empty_key_pool_rejected() {
    clear_env();
    let (_dir, path) = write_config("api_keys: []\n");
    assert!(matches!(load_config(&path), Err(AppError::Config(_))));
}

#[test]
#[serial]
fn test_blank_keys_are_dropped() {
    clear_env();
    let (_dir, path) = write_config("api_keys: ['  ', real-key, '']\n");
    let config = load_config(&path).unwrap();
    assert_eq!(config.api_keys, vec!["real-key"]);
}

#[test]
#[serial]
fn test_invalid_target_url_rejected() {
    clear_env();
    let (_dir, path) = write_config(
        r"
api_keys: [k]
target_url: 'not a url'
",
    );
    assert!(matches!(load_config(&path), Err(AppError::Config(_))));
}

#[test]
#[serial]
fn test_unknown_field_rejected() {
    clear_env();
    let (_dir, path) = write_config(
        r"
api_keys: [k]
bogus_field: true
",
    );
    assert!(matches!(load_config(&path), Err(AppError::YamlParsing(_))));
}

#[rstest]
#[case::zero_attempts(0, 1)]
#[case::zero_cap(1, 0)]
fn test_zero_limits_rejected(#[case] max_attempts: u32, #[case] daily_cap: u32) {
    let mut config = AppConfig::default();
    config.api_keys = vec!["k".to_string()];
    config.retry.max_attempts = max_attempts;
    config.rate_limit.daily_cap = daily_cap;
    assert!(matches!(validate(&config), Err(AppError::Config(_))));
}

#[test]
fn test_validate_accepts_minimal_config() {
    let mut config = AppConfig::default();
    config.api_keys = vec!["k".to_string()];
    assert!(validate(&config).is_ok());
}
