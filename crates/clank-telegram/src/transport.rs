//! Multi-origin Bot API client.
//!
//! Every call walks the configured origins in rotation order, starting at the
//! active one, and retries transient failures with backoff. The active origin
//! follows whichever origin last answered successfully, so one bad origin
//! costs a single failed attempt rather than one per call.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use clank_core::Settings;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{TelegramError, TelegramResult};

/// Attempts per call when nothing is configured.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// What a single Bot API request produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResult {
    pub ok: bool,
    /// `None` when the request never got an HTTP response.
    pub http_status: Option<u16>,
    /// The API's own `error_code`; `None` when the body was not a Bot API
    /// envelope (network failure, gateway error page).
    pub error_code: Option<i64>,
    pub description: Option<String>,
    pub result: Option<Value>,
    pub origin_used: String,
    pub retry_after_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    ok: bool,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

impl ApiResult {
    fn from_response(origin: &str, status: u16, body: &str) -> Self {
        match serde_json::from_str::<Envelope>(body) {
            Ok(envelope) => Self {
                ok: envelope.ok,
                http_status: Some(status),
                error_code: envelope.error_code,
                description: envelope.description,
                result: envelope.result,
                origin_used: origin.to_string(),
                retry_after_secs: envelope.parameters.and_then(|p| p.retry_after),
            },
            Err(_) => Self {
                ok: false,
                http_status: Some(status),
                error_code: None,
                description: Some(format!("non-API response (HTTP {status})")),
                result: None,
                origin_used: origin.to_string(),
                retry_after_secs: None,
            },
        }
    }

    fn network(origin: &str, error: reqwest::Error) -> Self {
        // The request URL embeds the token.
        let error = error.without_url();
        let description = if error.is_timeout() {
            "request timed out".to_string()
        } else {
            format!("network error: {error}")
        };
        Self {
            ok: false,
            http_status: None,
            error_code: None,
            description: Some(description),
            result: None,
            origin_used: origin.to_string(),
            retry_after_secs: None,
        }
    }

    pub fn description(&self) -> &str {
        self.description.as_deref().unwrap_or("")
    }

    /// One-line summary for logs and errors.
    pub fn summary(&self) -> String {
        match (self.error_code, self.http_status) {
            (Some(code), _) => format!("{code} via {}: {}", self.origin_used, self.description()),
            (None, Some(status)) => {
                format!("HTTP {status} via {}: {}", self.origin_used, self.description())
            }
            (None, None) => format!("{} via {}", self.description(), self.origin_used),
        }
    }

    /// Decodes `result` into `T`.
    pub fn decode<T: DeserializeOwned>(&self, method: &str) -> TelegramResult<T> {
        let value = self.result.clone().unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(|e| TelegramError::Decode {
            method: method.to_string(),
            reason: e.to_string(),
        })
    }

    /// The error a non-ok result stands for.
    pub fn into_error(self, method: &str) -> TelegramError {
        let description = self
            .description
            .unwrap_or_else(|| "no description".to_string());
        match self.error_code {
            Some(401) => TelegramError::Unauthorized {
                method: method.to_string(),
                description,
            },
            Some(409) => TelegramError::Conflict(description),
            code => TelegramError::Api {
                method: method.to_string(),
                code,
                description,
            },
        }
    }
}

/// How a result steers the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Success,
    /// Transient: try again on the next origin.
    Retry,
    /// Permanent: hand the result back without retrying.
    Stop,
}

/// Backoff and the table of retryable API error codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// API `error_code`s below 500 that are still transient (429 by default).
    pub retry_api_codes: Vec<i64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            retry_api_codes: vec![429],
        }
    }
}

impl RetryPolicy {
    /// Classifies one result.
    ///
    /// Anything without an API `error_code` (network failures, gateway error
    /// pages) is ambiguous and retried. API errors are retried when they are
    /// 5xx or listed in `retry_api_codes`; every other API error is final.
    pub fn classify(&self, result: &ApiResult) -> Verdict {
        if result.ok {
            return Verdict::Success;
        }
        match result.error_code {
            None => Verdict::Retry,
            Some(code) if code >= 500 || self.retry_api_codes.contains(&code) => Verdict::Retry,
            Some(_) => Verdict::Stop,
        }
    }

    /// Delay before the attempt after `attempt` (zero-based).
    ///
    /// A server-provided `retry_after` is honoured as given; otherwise the
    /// exponential backoff is capped at `max_delay`.
    pub fn delay(&self, attempt: u32, retry_after_secs: Option<u64>) -> Duration {
        match retry_after_secs {
            Some(secs) => Duration::from_secs(secs),
            None => self
                .base_delay
                .saturating_mul(2u32.saturating_pow(attempt.min(16)))
                .min(self.max_delay),
        }
    }
}

/// Static transport configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub origins: Vec<String>,
    pub request_timeout: Duration,
    pub probe_timeout: Duration,
    pub max_attempts: u32,
    pub retry: RetryPolicy,
}

impl TransportConfig {
    /// Defaults for the given origins.
    pub fn with_origins(origins: Vec<String>) -> Self {
        Self {
            origins,
            request_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry: RetryPolicy::default(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let telegram = &settings.telegram;
        Self {
            origins: settings.api_origins(),
            request_timeout: Duration::from_secs(telegram.request_timeout_secs),
            probe_timeout: Duration::from_secs(telegram.probe_timeout_secs),
            max_attempts: telegram.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
            retry: RetryPolicy {
                base_delay: Duration::from_millis(telegram.retry_base_ms),
                max_delay: Duration::from_millis(telegram.retry_max_ms),
                retry_api_codes: telegram.retry_api_codes.clone(),
            },
        }
    }
}

/// Bot API client shared by delivery and polling.
pub struct TransportClient {
    http: reqwest::Client,
    token: String,
    config: TransportConfig,
    active: AtomicUsize,
}

impl TransportClient {
    pub fn new(token: impl Into<String>, config: TransportConfig) -> TelegramResult<Self> {
        if config.origins.is_empty() {
            return Err(TelegramError::Client("no API origins configured".to_string()));
        }
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| TelegramError::Client(e.to_string()))?;
        Ok(Self {
            http,
            token: token.into(),
            config,
            active: AtomicUsize::new(0),
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Returns a masked version of the bot token for safe logging.
    pub fn bot_token_masked(&self) -> String {
        mask_token(&self.token)
    }

    pub fn origins(&self) -> &[String] {
        &self.config.origins
    }

    /// The origin the next call starts with.
    pub fn active_origin(&self) -> &str {
        &self.config.origins[self.active.load(Ordering::Relaxed) % self.config.origins.len()]
    }

    /// Attempts per call: the configured count, never fewer than the origins.
    pub fn max_attempts(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.config.max_attempts)
            .max(self.config.origins.len() as u32)
            .max(1)
    }

    /// Calls `method`, rotating origins and retrying transient failures.
    ///
    /// Returns the result on success or on a permanent failure (check
    /// [`ApiResult::ok`]). Errors with [`TelegramError::Exhausted`] after
    /// exactly `max_attempts` transient failures.
    pub async fn call(
        &self,
        method: &str,
        params: &Value,
        max_attempts: Option<u32>,
    ) -> TelegramResult<ApiResult> {
        let origins = &self.config.origins;
        let attempts = self.max_attempts(max_attempts);
        let start = self.active.load(Ordering::Relaxed);
        let timeout = self.config.request_timeout + long_poll_timeout(params);
        let mut last = None;

        for attempt in 0..attempts {
            let index = (start + attempt as usize) % origins.len();
            let origin = origins[index].as_str();
            let result = self.send(origin, method, params, timeout).await;

            match self.config.retry.classify(&result) {
                Verdict::Success => {
                    if index != start % origins.len() {
                        info!(origin, method, "Switched active API origin");
                    }
                    self.active.store(index, Ordering::Relaxed);
                    return Ok(result);
                }
                Verdict::Stop => {
                    debug!(origin, method, error = %result.summary(), "Bot API call rejected");
                    return Ok(result);
                }
                Verdict::Retry => {
                    warn!(
                        origin,
                        method,
                        attempt = attempt + 1,
                        attempts,
                        error = %result.summary(),
                        "Bot API call failed"
                    );
                    if attempt + 1 < attempts {
                        let delay = self.config.retry.delay(attempt, result.retry_after_secs);
                        tokio::time::sleep(delay).await;
                    }
                    last = Some(result);
                }
            }
        }

        Err(TelegramError::Exhausted {
            method: method.to_string(),
            attempts,
            last: last.map(|r| r.summary()).unwrap_or_default(),
        })
    }

    /// One attempt against one origin with the probe timeout.
    ///
    /// Used by health probes; never rotates, retries, or moves the active
    /// origin.
    pub async fn call_at_origin(&self, origin: &str, method: &str, params: &Value) -> ApiResult {
        let origin = origin.trim_end_matches('/');
        self.send(origin, method, params, self.config.probe_timeout)
            .await
    }

    /// Calls `method` and decodes a successful result, mapping failures to errors.
    pub async fn request<T: DeserializeOwned>(&self, method: &str, params: &Value) -> TelegramResult<T> {
        let result = self.call(method, params, None).await?;
        if !result.ok {
            return Err(result.into_error(method));
        }
        result.decode(method)
    }

    /// `getMe`: confirms the token and names the bot.
    pub async fn get_me(&self) -> TelegramResult<BotUser> {
        self.request("getMe", &serde_json::json!({})).await
    }

    async fn send(&self, origin: &str, method: &str, params: &Value, timeout: Duration) -> ApiResult {
        let url = format!("{origin}/bot{}/{method}", self.token);
        debug!(origin, method, "Bot API request");

        let response = match self
            .http
            .post(&url)
            .json(params)
            .timeout(timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return ApiResult::network(origin, e),
        };

        let status = response.status().as_u16();
        match response.text().await {
            Ok(body) => ApiResult::from_response(origin, status, &body),
            Err(e) => ApiResult::network(origin, e),
        }
    }
}

impl fmt::Debug for TransportClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportClient")
            .field("bot_token", &self.bot_token_masked())
            .field("origins", &self.config.origins)
            .field("active_origin", &self.active_origin())
            .finish_non_exhaustive()
    }
}

/// The bot account behind a token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BotUser {
    pub id: i64,
    pub first_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

/// Shows the first and last four characters of a token.
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    } else {
        "****".to_string()
    }
}

/// Extra time a long-poll call needs on top of the request timeout.
fn long_poll_timeout(params: &Value) -> Duration {
    params
        .get("timeout")
        .and_then(Value::as_u64)
        .map(Duration::from_secs)
        .unwrap_or_default()
}
