//! # clank-proto
//!
//! Shared types and traits for the Clank token-deployment bot.
//!
//! This crate provides the foundational abstractions used across all Clank crates:
//! - The [`TokenDraft`] a chat builds up and its [`Fees`] invariant
//! - Inbound chat events and the outbound actions the conversation produces
//! - The deployment config handed to the external deployer
//! - Collaborator traits for deployment, file resolution, image upload, and link parsing

mod collaborators;
mod deploy;
mod draft;
mod event;

pub use collaborators::{ExtractedLinks, FileResolver, ImageUploader, LinkExtractor};
pub use deploy::{DeployConfig, DeployOutcome, TokenDeployer};
pub use draft::{DEFAULT_FEE_BPS, DraftContext, Fees, MAX_FEE_BPS, TokenDraft};
pub use event::{Button, InboundEvent, Keyboard, OutboundAction};
