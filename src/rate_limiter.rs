// src/rate_limiter.rs

use crate::clock::Clock;
use crate::config::RateLimitConfig;
use crate::error::{AppError, Result};
use crate::storage::{StateStore, ThrottleState};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Keeps outbound requests inside a fixed budget shared across all keys:
/// a minimum interval between consecutive dispatches and a hard daily cap.
///
/// The daily counter is advisory. It fails fast locally once the cap is
/// reached, but the vendor's own 429 remains the authoritative quota signal
/// and is handled by the orchestrator.
pub struct RateLimiter {
    min_interval: Duration,
    daily_cap: u32,
    state: ThrottleState,
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub async fn new(
        config: &RateLimitConfig,
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let state = store
            .load_throttle()
            .await?
            .unwrap_or_else(|| ThrottleState::new(clock.day_key()));

        let mut limiter = Self {
            min_interval: Duration::from_millis(config.min_interval_ms),
            daily_cap: config.daily_cap,
            state,
            store,
            clock,
        };
        limiter.reset_if_new_day();
        limiter.persist().await?;

        info!(
            min_interval_ms = config.min_interval_ms,
            daily_cap = config.daily_cap,
            requests_today = limiter.state.request_count,
            "Rate limiter initialized"
        );
        Ok(limiter)
    }

    /// Claims a dispatch slot and returns how long the caller must wait
    /// before actually sending.
    ///
    /// Fails fast with [`AppError::DailyQuotaExceeded`] at the cap instead of
    /// blocking until midnight. On success the daily counter is incremented
    /// and the *scheduled* dispatch time (`max(now, last + interval)`) is
    /// recorded, so two consecutive slots are never closer than the minimum
    /// interval even if callers are delayed between reserving and sending.
    pub async fn reserve_slot(&mut self) -> Result<Duration> {
        self.reset_if_new_day();

        if self.state.request_count >= self.daily_cap {
            warn!(
                daily_cap = self.daily_cap,
                "Daily request cap reached. Rejecting without waiting."
            );
            return Err(AppError::DailyQuotaExceeded {
                limit: self.daily_cap,
            });
        }

        let now_ms = self.clock.unix_millis();
        let min_ms = self.min_interval.as_millis() as i64;
        let scheduled_ms = (self.state.last_dispatch_ms + min_ms).max(now_ms);
        let delay = Duration::from_millis((scheduled_ms - now_ms) as u64);

        self.state.request_count += 1;
        self.state.last_dispatch_ms = scheduled_ms;
        self.persist().await?;

        debug!(
            requests_today = self.state.request_count,
            delay_ms = delay.as_millis() as u64,
            "Reserved request slot"
        );
        Ok(delay)
    }

    /// Reserves a slot and sleeps out the required delay.
    pub async fn await_slot(&mut self) -> Result<()> {
        let delay = self.reserve_slot().await?;
        if !delay.is_zero() {
            debug!(?delay, "Throttling outbound request");
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    pub fn requests_today(&self) -> u32 {
        if self.state.day == self.clock.day_key() {
            self.state.request_count
        } else {
            0
        }
    }

    pub fn daily_cap(&self) -> u32 {
        self.daily_cap
    }

    fn reset_if_new_day(&mut self) -> bool {
        let today = self.clock.day_key();
        if self.state.day == today {
            return false;
        }
        info!(day = %today, previous_count = self.state.request_count, "New calendar day: resetting daily request counter");
        self.state.request_count = 0;
        self.state.day = today;
        true
    }

    async fn persist(&self) -> Result<()> {
        self.store.save_throttle(&self.state).await
    }
}
