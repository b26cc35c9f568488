// src/key_manager.rs

use crate::clock::Clock;
use crate::error::{AppError, Result};
use crate::storage::{RotationState, StateStore};
use secrecy::{ExposeSecret, Secret};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Masks an API key for logs and errors, e.g. `AIza...WXYZ`.
pub fn preview(key: &str) -> String {
    if key.len() > 8 {
        format!("{}...{}", &key[..4], &key[key.len() - 4..])
    } else {
        key.to_string()
    }
}

/// Manages the ordered API key pool: which key is active, which keys have
/// failed today, and the once-per-day clearing of failure marks.
///
/// State lives behind an injected [`StateStore`] so it survives restarts, and
/// the injected [`Clock`] drives the lazy daily reset. Callers that may run
/// concurrently must serialize access (the chat service holds this behind a
/// mutex) so two requests cannot race `advance_to_next_key`.
pub struct KeyManager {
    keys: Vec<Secret<String>>,
    state: RotationState,
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
}

impl KeyManager {
    /// Loads persisted rotation state and clamps it to the configured pool.
    /// The pool must be non-empty.
    #[instrument(skip_all, fields(pool_size = keys.len()))]
    pub async fn new(
        keys: Vec<String>,
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if keys.is_empty() {
            return Err(AppError::NoKeysConfigured);
        }
        let keys: Vec<Secret<String>> = keys.into_iter().map(Secret::new).collect();

        let mut state = store
            .load_rotation()
            .await?
            .unwrap_or_else(|| RotationState::new(clock.day_key()));

        // Persisted state may come from a run with a different pool size.
        if state.cursor >= keys.len() {
            state.cursor = 0;
        }
        let pool_size = keys.len();
        state.failed.retain(|&index| index < pool_size);

        let mut manager = Self {
            keys,
            state,
            store,
            clock,
        };
        manager.reset_if_new_day();
        manager.normalize_cursor();
        manager.persist().await?;

        info!(
            pool_size = manager.keys.len(),
            cursor = manager.state.cursor,
            failed = manager.state.failed.len(),
            "Key manager initialized"
        );
        Ok(manager)
    }

    /// Returns the active key and its index, applying the daily reset first.
    pub async fn current_key(&mut self) -> Result<(usize, Secret<String>)> {
        if self.reset_if_new_day() {
            self.persist().await?;
        }
        let index = self.state.cursor;
        let key = self
            .keys
            .get(index)
            .cloned()
            .ok_or(AppError::NoKeysConfigured)?;
        Ok((index, key))
    }

    /// Marks the active key as failed for today and moves the cursor to the
    /// next non-failed key, scanning forward with wraparound.
    ///
    /// Returns `false` — leaving the cursor unchanged — when every key is now
    /// marked failed. That terminal state is cleared by the daily reset or by
    /// [`Self::reset_failed_keys`].
    #[instrument(level = "warn", skip(self), fields(cursor = self.state.cursor))]
    pub async fn advance_to_next_key(&mut self) -> Result<bool> {
        self.reset_if_new_day();

        let len = self.keys.len();
        let current = self.state.cursor;
        self.state.failed.insert(current);
        warn!(
            key.preview = %preview(self.keys[current].expose_secret()),
            index = current,
            "Marking API key as failed for today"
        );

        for offset in 1..len {
            let candidate = (current + offset) % len;
            if !self.state.failed.contains(&candidate) {
                self.state.cursor = candidate;
                self.persist().await?;
                info!(from = current, to = candidate, "Rotated to next available key");
                return Ok(true);
            }
        }

        self.persist().await?;
        warn!("All API keys are marked failed for today");
        Ok(false)
    }

    /// Clears every failure mark. Runs automatically on the first access of a
    /// new calendar day; exposed for manual resets.
    pub async fn reset_failed_keys(&mut self) -> Result<()> {
        self.state.failed.clear();
        self.state.day = self.clock.day_key();
        self.persist().await?;
        info!("Cleared all key failure marks");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.state.cursor
    }

    pub fn failed_count(&self) -> usize {
        self.state.failed.len()
    }

    pub fn all_failed(&self) -> bool {
        self.state.failed.len() == self.keys.len()
    }

    fn reset_if_new_day(&mut self) -> bool {
        let today = self.clock.day_key();
        if self.state.day == today {
            return false;
        }
        info!(
            day = %today,
            cleared = self.state.failed.len(),
            "New calendar day: clearing key failure marks"
        );
        self.state.failed.clear();
        self.state.day = today;
        true
    }

    /// Keeps the invariant that the cursor points at a non-failed key
    /// whenever one exists.
    fn normalize_cursor(&mut self) {
        if !self.state.failed.contains(&self.state.cursor) {
            return;
        }
        let len = self.keys.len();
        for offset in 1..len {
            let candidate = (self.state.cursor + offset) % len;
            if !self.state.failed.contains(&candidate) {
                debug!(
                    from = self.state.cursor,
                    to = candidate,
                    "Moving cursor off a failed key"
                );
                self.state.cursor = candidate;
                return;
            }
        }
    }

    async fn persist(&self) -> Result<()> {
        self.store.save_rotation(&self.state).await
    }
}
