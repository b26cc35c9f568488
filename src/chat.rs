// src/chat.rs

use crate::clock::Clock;
use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::gemini::{Content, GeminiClient, GenerationConfig, Part, Role};
use crate::key_manager::KeyManager;
use crate::rate_limiter::RateLimiter;
use crate::storage::StateStore;
use dashmap::DashMap;
use secrecy::Secret;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// One prior exchange in the conversation, as sent by the UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub text: String,
}

/// Snapshot of pool and throttle state for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub keys_total: usize,
    pub keys_failed: usize,
    pub cursor: usize,
    pub requests_today: u32,
    pub daily_cap: u32,
}

/// Composes the rate limiter, the key pool and the outbound client into one
/// chat call with automatic recovery.
///
/// Rotation state and counters sit behind mutexes so concurrent requests
/// cannot race `advance_to_next_key` or the daily counter; the outbound HTTP
/// call itself runs without any lock held.
pub struct ChatService {
    models: Vec<String>,
    max_attempts: u32,
    backoff_base: Duration,
    history_window: usize,
    generation: GenerationConfig,
    target_url: String,
    http: reqwest::Client,
    key_manager: Mutex<KeyManager>,
    rate_limiter: Mutex<RateLimiter>,
    /// Lazily built per-key clients, invalidated when their key leaves
    /// rotation.
    clients: DashMap<usize, GeminiClient>,
}

impl ChatService {
    pub async fn new(
        config: &AppConfig,
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
        http: reqwest::Client,
    ) -> Result<Self> {
        let key_manager =
            KeyManager::new(config.api_keys.clone(), store.clone(), clock.clone()).await?;
        let rate_limiter = RateLimiter::new(&config.rate_limit, store, clock).await?;

        Ok(Self {
            models: config.models.clone(),
            max_attempts: config.retry.max_attempts,
            backoff_base: Duration::from_millis(config.retry.backoff_base_ms),
            history_window: config.history_window,
            generation: GenerationConfig::from(&config.generation),
            target_url: config.target_url.clone(),
            http,
            key_manager: Mutex::new(key_manager),
            rate_limiter: Mutex::new(rate_limiter),
            clients: DashMap::new(),
        })
    }

    /// Produces a reply for the given prompt and history window.
    ///
    /// Never returns a raw error for expected failure modes: exhausted keys,
    /// quota limits and upstream trouble all come back as a pre-formatted,
    /// user-actionable message.
    #[instrument(skip(self, prompt, history), fields(history_len = history.len()))]
    pub async fn get_chat_response(&self, prompt: &str, history: &[ChatTurn]) -> String {
        match self.try_chat(prompt, history).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Chat request ended in a terminal error");
                e.user_message()
            }
        }
    }

    /// The full recovery loop: slot, key, model fallback, then rotation or
    /// backoff, bounded by the retry ceiling.
    async fn try_chat(&self, prompt: &str, history: &[ChatTurn]) -> Result<String> {
        let contents = self.build_contents(prompt, history);
        let mut attempts: u32 = 0;

        loop {
            let (index, key) = {
                let mut manager = self.key_manager.lock().await;
                let pair = manager.current_key().await?;
                // A pool already exhausted before this request fails fast,
                // without consuming a throttle slot. Mid-request retries may
                // still probe the last key until the ceiling.
                if attempts == 0 && manager.all_failed() {
                    return Err(AppError::AllKeysFailed);
                }
                pair
            };

            self.wait_for_slot().await?;
            let client = self.client_for(index, key);

            match self.generate_with_model_fallback(&client, &contents).await {
                Ok(text) if !text.is_empty() => return Ok(text),
                Ok(_) => return self.regenerate_direct(&client, prompt).await,
                Err(e) if e.is_rotation_trigger() => {
                    attempts += 1;
                    let rotated = {
                        let mut manager = self.key_manager.lock().await;
                        let rotated = manager.advance_to_next_key().await?;
                        self.clients.remove(&index);
                        rotated
                    };
                    if attempts >= self.max_attempts {
                        return Err(if rotated {
                            AppError::RetriesExhausted { attempts }
                        } else {
                            AppError::AllKeysFailed
                        });
                    }
                    if !rotated {
                        // No other key exists; give the upstream a moment
                        // before the remaining retries on the same key.
                        tokio::time::sleep(self.backoff_delay(attempts)).await;
                    }
                    debug!(attempt = attempts, rotated, "Retrying after key failure");
                }
                Err(e) if e.is_transient() => {
                    attempts += 1;
                    if attempts >= self.max_attempts {
                        return Err(e);
                    }
                    let delay = self.backoff_delay(attempts);
                    info!(attempt = attempts, ?delay, "Upstream busy. Backing off before retry.");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Walks the model preference list, falling through on unavailable
    /// models only. All other outcomes belong to the caller's recovery loop.
    async fn generate_with_model_fallback(
        &self,
        client: &GeminiClient,
        contents: &[Content],
    ) -> Result<String> {
        let mut last: Option<AppError> = None;
        for model in &self.models {
            match client.generate(model, contents).await {
                Err(e @ AppError::ModelUnavailable { .. }) => {
                    warn!(model = %model, "Model unavailable. Trying next preference.");
                    last = Some(e);
                }
                other => return other,
            }
        }
        Err(last.unwrap_or_else(|| AppError::Config("model preference list is empty".to_string())))
    }

    /// One history-free regeneration after an empty reply, then give up.
    async fn regenerate_direct(&self, client: &GeminiClient, prompt: &str) -> Result<String> {
        debug!("Empty reply. Attempting one direct regeneration.");
        self.wait_for_slot().await?;
        let contents = [Content::user(prompt)];
        let text = self.generate_with_model_fallback(client, &contents).await?;
        if text.is_empty() {
            Err(AppError::EmptyResponse)
        } else {
            Ok(text)
        }
    }

    /// Reserves a throttle slot under the lock, then waits out the delay
    /// without holding it.
    async fn wait_for_slot(&self) -> Result<()> {
        let delay = self.rate_limiter.lock().await.reserve_slot().await?;
        if !delay.is_zero() {
            debug!(?delay, "Holding request to honor minimum spacing");
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    fn client_for(&self, index: usize, key: Secret<String>) -> GeminiClient {
        self.clients
            .entry(index)
            .or_insert_with(|| {
                GeminiClient::new(
                    self.http.clone(),
                    self.target_url.clone(),
                    key,
                    self.generation.clone(),
                )
            })
            .clone()
    }

    fn build_contents(&self, prompt: &str, history: &[ChatTurn]) -> Vec<Content> {
        let start = history.len().saturating_sub(self.history_window);
        let mut contents: Vec<Content> = history[start..]
            .iter()
            .map(|turn| Content {
                role: turn.role.clone(),
                parts: vec![Part {
                    text: turn.text.clone(),
                }],
            })
            .collect();
        contents.push(Content::user(prompt));
        contents
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_base * 2u32.saturating_pow(attempt.saturating_sub(1))
    }

    /// Clears all failure marks, making every key usable again.
    pub async fn reset_failed_keys(&self) -> Result<()> {
        self.clients.clear();
        self.key_manager.lock().await.reset_failed_keys().await
    }

    pub async fn status(&self) -> ServiceStatus {
        let manager = self.key_manager.lock().await;
        let limiter = self.rate_limiter.lock().await;
        ServiceStatus {
            keys_total: manager.len(),
            keys_failed: manager.failed_count(),
            cursor: manager.cursor(),
            requests_today: limiter.requests_today(),
            daily_cap: limiter.daily_cap(),
        }
    }
}
