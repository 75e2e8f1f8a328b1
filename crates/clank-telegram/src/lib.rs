//! # clank-telegram
//!
//! The Telegram side of the Clank deploy bot, over raw Bot API calls.
//!
//! ## Key Components
//!
//! - [`TransportClient`]: Multi-origin calls with failure classification,
//!   retry/backoff, and a sticky active origin
//! - [`MessageDelivery`]: [`BotApi`] with HTML fallback, idempotent edits,
//!   and length capping
//! - [`UpdatePoller`]: The long-poll loop with offset tracking and
//!   conflict/auth escalation to [`FatalError`]
//! - [`DeployBot`]: Routes updates through the conversation engine
//! - [`error`]: Error types and the fatal exit code

mod bot;
pub mod delivery;
pub mod error;
pub mod poll;
pub mod transport;
pub mod updates;

pub use bot::DeployBot;
pub use delivery::{BotApi, MESSAGE_MAX_CHARS, MessageDelivery};
pub use error::{EXIT_CONFIG, FatalError, TelegramError, TelegramResult};
pub use poll::{PollConfig, UpdateHandler, UpdatePoller, UpdateSource};
pub use transport::{
    ApiResult, BotUser, RetryPolicy, TransportClient, TransportConfig, Verdict, mask_token,
};
pub use updates::Update;
