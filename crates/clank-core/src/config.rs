//! Bot configuration.
//!
//! Settings come from an optional `clank.yml` and are then overridden by
//! environment variables (a `.env` file is loaded first when present).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default bot API origin.
pub const DEFAULT_API_ORIGIN: &str = "https://api.telegram.org";

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "clank.yml";

/// Errors raised while loading settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Top-level settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub telegram: TelegramSettings,
    pub storage: StorageSettings,
    pub session: SessionSettings,
    pub deploy: DeploySettings,
}

/// Transport, delivery, and polling knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramSettings {
    pub bot_token: Option<String>,
    /// Ordered list of API origins; the first is preferred at startup.
    pub api_origins: Vec<String>,
    /// Origin for file downloads; derived from the first API origin when unset.
    pub file_origin: Option<String>,
    pub request_timeout_secs: u64,
    /// Timeout for out-of-band health probes against a single origin.
    pub probe_timeout_secs: u64,
    /// Attempts per call; never fewer than the number of origins.
    pub max_attempts: Option<u32>,
    pub retry_base_ms: u64,
    pub retry_max_ms: u64,
    /// API `error_code`s that are retried. Every 5xx is retried regardless.
    pub retry_api_codes: Vec<i64>,
    pub poll_timeout_secs: u64,
    pub poll_backoff_base_ms: u64,
    pub poll_backoff_max_ms: u64,
    pub conflict_backoff_base_ms: u64,
    pub conflict_backoff_max_ms: u64,
    /// Consecutive polling conflicts tolerated before a fatal exit.
    pub max_conflict_errors: u32,
    pub message_max_chars: usize,
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            bot_token: None,
            api_origins: vec![DEFAULT_API_ORIGIN.to_string()],
            file_origin: None,
            request_timeout_secs: 30,
            probe_timeout_secs: 5,
            max_attempts: None,
            retry_base_ms: 500,
            retry_max_ms: 10_000,
            retry_api_codes: vec![429],
            poll_timeout_secs: 30,
            poll_backoff_base_ms: 1_000,
            poll_backoff_max_ms: 60_000,
            conflict_backoff_base_ms: 5_000,
            conflict_backoff_max_ms: 60_000,
            max_conflict_errors: 5,
            message_max_chars: 4096,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub drafts_path: PathBuf,
    /// Explicit lock path; otherwise one lock per bot id under `.clank/`.
    pub lock_path: Option<PathBuf>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            drafts_path: PathBuf::from(".clank/drafts.json"),
            lock_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Idle sessions are dropped from memory after this long.
    pub idle_ttl_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_ttl_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploySettings {
    /// Address that receives admin rights over deployed tokens.
    pub deployer_address: Option<String>,
    /// External deploy command (program followed by arguments).
    pub command: Vec<String>,
    pub command_timeout_secs: u64,
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            deployer_address: None,
            command: Vec::new(),
            command_timeout_secs: 300,
        }
    }
}

impl Settings {
    /// Load settings from `path` (or `clank.yml` if present) plus the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        // Try to load .env file if it exists (ignore if it doesn't)
        let _ = dotenvy::dotenv();

        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        settings.apply_env(|var| std::env::var(var).ok())?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlay environment variables using `lookup`.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), SettingsError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        if let Some(token) = get("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = Some(token.trim().to_string());
        }
        if let Some(origins) = get("TELEGRAM_API_ORIGINS") {
            self.telegram.api_origins = origins.split(',').map(str::to_string).collect();
        }
        if let Some(origin) = get("TELEGRAM_FILE_ORIGIN") {
            self.telegram.file_origin = Some(origin);
        }
        if let Some(value) = get("TELEGRAM_MAX_CONFLICT_ERRORS") {
            self.telegram.max_conflict_errors = parse_env("TELEGRAM_MAX_CONFLICT_ERRORS", &value)?;
        }
        if let Some(value) = get("TELEGRAM_POLL_TIMEOUT") {
            self.telegram.poll_timeout_secs = parse_env("TELEGRAM_POLL_TIMEOUT", &value)?;
        }
        if let Some(value) = get("TELEGRAM_MAX_ATTEMPTS") {
            self.telegram.max_attempts = Some(parse_env("TELEGRAM_MAX_ATTEMPTS", &value)?);
        }
        if let Some(path) = get("CLANK_DRAFTS_PATH") {
            self.storage.drafts_path = PathBuf::from(path);
        }
        if let Some(path) = get("CLANK_LOCK_PATH") {
            self.storage.lock_path = Some(PathBuf::from(path));
        }
        if let Some(address) = get("DEPLOYER_ADDRESS") {
            self.deploy.deployer_address = Some(address.trim().to_string());
        }
        if let Some(command) = get("CLANK_DEPLOY_COMMAND") {
            self.deploy.command = command.split_whitespace().map(str::to_string).collect();
        }
        Ok(())
    }

    /// API origins, trimmed, without trailing slashes, de-duplicated in order.
    pub fn api_origins(&self) -> Vec<String> {
        let mut origins: Vec<String> = Vec::new();
        for origin in &self.telegram.api_origins {
            let origin = origin.trim().trim_end_matches('/');
            if !origin.is_empty() && !origins.iter().any(|o| o == origin) {
                origins.push(origin.to_string());
            }
        }
        if origins.is_empty() {
            origins.push(DEFAULT_API_ORIGIN.to_string());
        }
        origins
    }

    /// Origin used for `/file/bot<token>/<path>` downloads.
    pub fn file_origin(&self) -> String {
        self.telegram
            .file_origin
            .as_deref()
            .map(|o| o.trim().trim_end_matches('/').to_string())
            .filter(|o| !o.is_empty())
            .unwrap_or_else(|| self.api_origins()[0].clone())
    }

    /// Lock file path for the given bot token.
    ///
    /// Each credential set gets its own lock, named after the bot id (the
    /// public half of the token).
    pub fn lock_path(&self, bot_token: &str) -> PathBuf {
        if let Some(path) = &self.storage.lock_path {
            return path.clone();
        }
        let id = bot_id(bot_token).unwrap_or("default");
        PathBuf::from(".clank").join(format!("bot-{id}.lock"))
    }
}

/// The numeric bot id preceding the `:` in a bot token.
pub fn bot_id(bot_token: &str) -> Option<&str> {
    let (id, secret) = bot_token.split_once(':')?;
    (!id.is_empty() && !secret.is_empty() && id.chars().all(|c| c.is_ascii_digit())).then_some(id)
}

fn parse_env<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, SettingsError> {
    value
        .trim()
        .parse()
        .map_err(|_| SettingsError::InvalidEnv {
            var,
            value: value.to_string(),
        })
}
