//! Common test utilities and fixtures.
#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use gemini_relay::clock::ManualClock;
use gemini_relay::config::AppConfig;
use std::sync::Arc;

/// Fluent builder over [`AppConfig`] defaults.
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_keys.push(key.into());
        self
    }

    pub fn with_target_url(mut self, url: impl Into<String>) -> Self {
        self.config.target_url = url.into();
        self
    }

    pub fn with_models(mut self, models: &[&str]) -> Self {
        self.config.models = models.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.config.retry.max_attempts = attempts;
        self
    }

    pub fn with_backoff_base_ms(mut self, ms: u64) -> Self {
        self.config.retry.backoff_base_ms = ms;
        self
    }

    pub fn with_min_interval_ms(mut self, ms: u64) -> Self {
        self.config.rate_limit.min_interval_ms = ms;
        self
    }

    pub fn with_daily_cap(mut self, cap: u32) -> Self {
        self.config.rate_limit.daily_cap = cap;
        self
    }

    pub fn with_history_window(mut self, window: usize) -> Self {
        self.config.history_window = window;
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A clock frozen at a fixed midday instant; time only moves when advanced.
pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0).unwrap(),
    ))
}
