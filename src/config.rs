// src/config.rs

use crate::error::{AppError, Result};
use serde::Deserialize;
use std::{env, fs, io, path::Path, path::PathBuf};
use tracing::{info, warn};
use url::Url;

// Environment variable overrides
const ENV_API_KEYS: &str = "GEMINI_RELAY_API_KEYS";
const ENV_TARGET_URL: &str = "GEMINI_RELAY_TARGET_URL";
const ENV_STATE_PATH: &str = "GEMINI_RELAY_STATE_PATH";

/// Root application configuration, loaded from an optional YAML file with
/// environment-variable overrides applied on top.
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct AppConfig {
    pub server: ServerConfig,
    /// Base URL of the generative-language API.
    pub target_url: String,
    /// Ordered API key pool. Must be non-empty after overrides.
    pub api_keys: Vec<String>,
    /// Ordered model preference list; the first available one is used.
    pub models: Vec<String>,
    pub retry: RetryConfig,
    pub rate_limit: RateLimitConfig,
    pub generation: GenerationSettings,
    /// How many most-recent conversation turns are forwarded upstream.
    pub history_window: usize,
    /// Path of the JSON state file. In-memory state when unset.
    pub state_path: Option<PathBuf>,
}

/// Network address and outbound timeout settings.
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct RetryConfig {
    /// Retry ceiling for rotation and backoff recovery. Must be at least 1.
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct RateLimitConfig {
    /// Minimum spacing between consecutive outbound requests.
    pub min_interval_ms: u64,
    /// Hard daily request cap shared across all keys.
    pub daily_cap: u32,
}

/// Bounded generation parameters sent with every request.
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct GenerationSettings {
    pub temperature: f32,
    pub top_p: Option<f32>,
    pub max_output_tokens: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            target_url: default_target_url(),
            api_keys: Vec::new(),
            models: default_models(),
            retry: RetryConfig::default(),
            rate_limit: RateLimitConfig::default(),
            generation: GenerationSettings::default(),
            history_window: 10,
            state_path: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            connect_timeout_secs: 10,
            request_timeout_secs: 60,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 500,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 4000,
            daily_cap: 1500,
        }
    }
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: None,
            max_output_tokens: 1024,
        }
    }
}

fn default_target_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_models() -> Vec<String> {
    vec![
        "gemini-2.0-flash".to_string(),
        "gemini-1.5-flash".to_string(),
        "gemini-1.5-pro".to_string(),
    ]
}

/// Loads configuration from the given YAML file (optional) and applies
/// environment overrides, then validates the result.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let path_str = path.display().to_string();
    let mut config = match fs::read_to_string(path) {
        Ok(contents) if contents.trim().is_empty() => {
            warn!("Config file '{}' is empty. Using defaults.", path_str);
            AppConfig::default()
        }
        Ok(contents) => {
            let parsed: AppConfig = serde_yaml::from_str(&contents)?;
            info!("Loaded configuration from '{}'.", path_str);
            parsed
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!(
                "Config file '{}' not found. Using defaults and environment variables.",
                path_str
            );
            AppConfig::default()
        }
        Err(e) => {
            return Err(AppError::Io(io::Error::new(
                e.kind(),
                format!("Failed to read config file '{path_str}': {e}"),
            )))
        }
    };

    apply_env_overrides(&mut config);
    normalize(&mut config);
    validate(&config)?;
    Ok(config)
}

fn apply_env_overrides(config: &mut AppConfig) {
    if let Ok(keys) = env::var(ENV_API_KEYS) {
        config.api_keys = keys.split(',').map(|k| k.trim().to_string()).collect();
        info!(
            count = config.api_keys.len(),
            "API key pool taken from {}", ENV_API_KEYS
        );
    }
    if let Ok(url) = env::var(ENV_TARGET_URL) {
        config.target_url = url;
    }
    if let Ok(path) = env::var(ENV_STATE_PATH) {
        config.state_path = Some(PathBuf::from(path));
    }
}

fn normalize(config: &mut AppConfig) {
    config.api_keys.retain(|key| !key.trim().is_empty());
    for key in &mut config.api_keys {
        *key = key.trim().to_string();
    }
    config.target_url = config.target_url.trim_end_matches('/').to_string();
}

/// Validates the invariants the rest of the system relies on.
pub fn validate(config: &AppConfig) -> Result<()> {
    if config.api_keys.is_empty() {
        return Err(AppError::Config(format!(
            "at least one API key must be configured (set api_keys in the config file or {ENV_API_KEYS})"
        )));
    }
    Url::parse(&config.target_url)
        .map_err(|e| AppError::Config(format!("invalid target_url '{}': {e}", config.target_url)))?;
    if config.models.is_empty() {
        return Err(AppError::Config(
            "the model preference list must not be empty".to_string(),
        ));
    }
    if config.retry.max_attempts == 0 {
        return Err(AppError::Config(
            "retry.max_attempts must be at least 1".to_string(),
        ));
    }
    if config.rate_limit.daily_cap == 0 {
        return Err(AppError::Config(
            "rate_limit.daily_cap must be at least 1".to_string(),
        ));
    }
    Ok(())
}
