//! The long-poll update loop.
//!
//! One cycle fetches every update after the last consumed id, advances the
//! offset past the batch, then dispatches the batch in order. Failures decide
//! the next delay:
//!
//! - Conflict (another poller on the same token): `base × count`, capped;
//!   fatal once the count passes the configured ceiling.
//! - Rejected token: fatal at once.
//! - Anything else: `base × 2^errors`, capped; reset on the next success.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use clank_core::Settings;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::error::{FatalError, TelegramError, TelegramResult};
use crate::transport::TransportClient;
use crate::updates::Update;

/// Where updates come from.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Updates with `update_id >= offset`, waiting up to `timeout_secs`.
    async fn fetch(&self, offset: Option<i64>, timeout_secs: u64) -> TelegramResult<Vec<Update>>;
}

#[async_trait]
impl UpdateSource for TransportClient {
    async fn fetch(&self, offset: Option<i64>, timeout_secs: u64) -> TelegramResult<Vec<Update>> {
        let mut params = json!({
            "timeout": timeout_secs,
            "allowed_updates": ["message", "callback_query"],
        });
        if let Some(offset) = offset {
            params["offset"] = json!(offset);
        }
        self.request("getUpdates", &params).await
    }
}

#[async_trait]
impl<T: UpdateSource + ?Sized> UpdateSource for Arc<T> {
    async fn fetch(&self, offset: Option<i64>, timeout_secs: u64) -> TelegramResult<Vec<Update>> {
        (**self).fetch(offset, timeout_secs).await
    }
}

/// Receives every update the loop consumes.
#[async_trait]
pub trait UpdateHandler: Send {
    async fn handle_update(&mut self, update: Update);

    /// Runs once per cycle, after the batch.
    fn after_cycle(&mut self) {}
}

/// Poll loop timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    pub timeout_secs: u64,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub conflict_base: Duration,
    pub conflict_max: Duration,
    /// Consecutive conflicts tolerated; one more is fatal.
    pub max_conflict_errors: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(60),
            conflict_base: Duration::from_secs(5),
            conflict_max: Duration::from_secs(60),
            max_conflict_errors: 5,
        }
    }
}

impl PollConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        let telegram = &settings.telegram;
        Self {
            timeout_secs: telegram.poll_timeout_secs,
            backoff_base: Duration::from_millis(telegram.poll_backoff_base_ms),
            backoff_max: Duration::from_millis(telegram.poll_backoff_max_ms),
            conflict_base: Duration::from_millis(telegram.conflict_backoff_base_ms),
            conflict_max: Duration::from_millis(telegram.conflict_backoff_max_ms),
            max_conflict_errors: telegram.max_conflict_errors,
        }
    }
}

/// Drives an [`UpdateSource`] into an [`UpdateHandler`].
pub struct UpdatePoller<S> {
    source: S,
    config: PollConfig,
    /// Next update id to request; everything below it is consumed.
    offset: Option<i64>,
    conflicts: u32,
    errors: u32,
}

impl<S: UpdateSource> UpdatePoller<S> {
    pub fn new(source: S, config: PollConfig) -> Self {
        Self {
            source,
            config,
            offset: None,
            conflicts: 0,
            errors: 0,
        }
    }

    pub fn offset(&self) -> Option<i64> {
        self.offset
    }

    pub fn conflicts(&self) -> u32 {
        self.conflicts
    }

    pub fn errors(&self) -> u32 {
        self.errors
    }

    /// Runs one cycle and returns how long to wait before the next.
    pub async fn poll_once<H>(&mut self, handler: &mut H) -> Result<Duration, FatalError>
    where
        H: UpdateHandler + ?Sized,
    {
        match self.source.fetch(self.offset, self.config.timeout_secs).await {
            Ok(updates) => {
                self.conflicts = 0;
                self.errors = 0;

                let floor = self.offset;
                if let Some(max) = updates.iter().map(|u| u.update_id).max() {
                    self.offset = Some(floor.map_or(max + 1, |o| o.max(max + 1)));
                }

                for update in updates {
                    if floor.is_some_and(|f| update.update_id < f) {
                        debug!(update_id = update.update_id, "Skipping already consumed update");
                        continue;
                    }
                    debug!(update_id = update.update_id, "Dispatching update");
                    handler.handle_update(update).await;
                }
                Ok(Duration::ZERO)
            }
            Err(TelegramError::Conflict(description)) => {
                self.conflicts += 1;
                if self.conflicts > self.config.max_conflict_errors {
                    error!(
                        conflicts = self.conflicts,
                        "Another process keeps polling with this token"
                    );
                    return Err(FatalError::new(format!(
                        "getUpdates conflict persisted for {} consecutive polls: {description}",
                        self.conflicts
                    )));
                }
                let delay = self
                    .config
                    .conflict_base
                    .saturating_mul(self.conflicts)
                    .min(self.config.conflict_max);
                warn!(
                    conflicts = self.conflicts,
                    delay_ms = delay.as_millis() as u64,
                    "Another process is polling with this token, backing off"
                );
                Ok(delay)
            }
            Err(TelegramError::Unauthorized { description, .. }) => {
                error!(error = %description, "Bot token rejected while polling");
                Err(FatalError::new(format!("bot token rejected: {description}")))
            }
            Err(e) => {
                let delay = self
                    .config
                    .backoff_base
                    .saturating_mul(2u32.saturating_pow(self.errors.min(16)))
                    .min(self.config.backoff_max);
                self.errors += 1;
                warn!(
                    error = %e,
                    errors = self.errors,
                    delay_ms = delay.as_millis() as u64,
                    "Polling failed, backing off"
                );
                Ok(delay)
            }
        }
    }

    /// Polls until `shutdown` is set or a fatal condition occurs.
    pub async fn run<H>(&mut self, handler: &mut H, shutdown: &AtomicBool) -> Result<(), FatalError>
    where
        H: UpdateHandler + ?Sized,
    {
        info!(timeout_secs = self.config.timeout_secs, "Polling for updates");
        while !shutdown.load(Ordering::Relaxed) {
            let delay = self.poll_once(handler).await?;
            handler.after_cycle();
            if !delay.is_zero() {
                sleep_unless_shutdown(delay, shutdown).await;
            }
        }
        info!("Poll loop stopped");
        Ok(())
    }
}

async fn sleep_unless_shutdown(delay: Duration, shutdown: &AtomicBool) {
    const SLICE: Duration = Duration::from_millis(250);
    let mut remaining = delay;
    while !remaining.is_zero() && !shutdown.load(Ordering::Relaxed) {
        let step = remaining.min(SLICE);
        tokio::time::sleep(step).await;
        remaining -= step;
    }
}
