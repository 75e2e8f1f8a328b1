use thiserror::Error;

/// Result type alias for telegram operations.
pub type TelegramResult<T> = std::result::Result<T, TelegramError>;

/// Exit code for conditions a supervisor should not blindly restart
/// (`EX_CONFIG` from sysexits.h).
pub const EXIT_CONFIG: i32 = 78;

/// Errors that can occur while talking to the Bot API.
#[derive(Debug, Error)]
pub enum TelegramError {
    /// Bot token is missing from flags, config, environment, and keychain.
    #[error(
        "telegram bot token not found: set TELEGRAM_BOT_TOKEN, configure telegram.bot_token, or run `clank token set`"
    )]
    MissingBotToken,

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    /// The API rejected the token.
    #[error("bot token rejected by {method}: {description}")]
    Unauthorized { method: String, description: String },

    /// Another process is long-polling with the same token.
    #[error("another process is polling with this token: {0}")]
    Conflict(String),

    /// The API answered with a permanent error for this call.
    #[error("{method} rejected ({}): {description}", code.map_or_else(|| "no code".to_string(), |c| c.to_string()))]
    Api {
        method: String,
        code: Option<i64>,
        description: String,
    },

    /// Every attempt failed with a retryable error.
    #[error("{method} failed after {attempts} attempts: {last}")]
    Exhausted {
        method: String,
        attempts: u32,
        last: String,
    },

    /// A successful response carried an unexpected payload.
    #[error("unexpected {method} result: {reason}")]
    Decode { method: String, reason: String },
}

impl TelegramError {
    /// `true` when the chat can't be messaged at all (blocked, deleted, kicked).
    pub fn is_unreachable_chat(&self) -> bool {
        match self {
            Self::Api { code: Some(403), .. } => true,
            Self::Api { description, .. } => {
                let description = description.to_ascii_lowercase();
                description.contains("chat not found") || description.contains("bot was blocked")
            }
            _ => false,
        }
    }
}

/// A condition that ends the process with [`EXIT_CONFIG`].
#[derive(Debug, Error)]
#[error("{reason}")]
pub struct FatalError {
    pub reason: String,
}

impl FatalError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn exit_code(&self) -> i32 {
        EXIT_CONFIG
    }
}
