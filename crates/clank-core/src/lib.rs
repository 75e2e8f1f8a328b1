//! # clank-core
//!
//! The conversation engine behind the Clank deploy bot.
//!
//! This crate provides:
//! - The per-chat conversation state machine and its readiness check
//! - Session caching over a crash-safe, atomically written draft store
//! - Parsers for fees, symbols, image references, and addresses
//! - Default link extraction for post/cast context and social profiles
//! - Deploy config building/validation and a command-backed deployer
//! - The single-instance lock and configuration loading

pub mod config;
pub mod conversation;
pub mod deploy_command;
pub mod deploy_config;
pub mod draft_store;
pub mod instance_lock;
pub mod links;
pub mod parse;
pub mod session;
pub mod text;

pub use config::{Settings, SettingsError, bot_id};
pub use conversation::{Conversation, ReadyStatus, Turn, get_ready_status};
pub use deploy_command::CommandDeployer;
pub use deploy_config::{
    ConfigError, NoteLevel, Validated, ValidationNote, create_config_from_session, validate_config,
};
pub use draft_store::{DraftStore, PresetSummary, StoreError};
pub use instance_lock::{InstanceLock, LockError, LockRecord, pid_is_alive};
pub use links::RegexLinkExtractor;
pub use parse::InputError;
pub use session::{ConversationState, Hydration, Session, SessionStore};
pub use text::{escape_html, strip_html, truncate_with_marker};
