//! The deployment boundary.
//!
//! The on-chain deploy itself is an external collaborator. Clank only builds a
//! [`DeployConfig`], hands it to a [`TokenDeployer`] exactly once per confirmed
//! deploy, and reports the [`DeployOutcome`] back to the chat.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::draft::{DraftContext, Fees, TokenDraft};

/// A fully-resolved deployment request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployConfig {
    pub name: String,
    pub symbol: String,
    pub image: Option<String>,
    pub description: Option<String>,
    /// Address that receives admin rights and creator rewards.
    pub token_admin: String,
    pub fees: Fees,
    pub context: DraftContext,
    pub socials: BTreeMap<String, String>,
    /// Reward recipient override, when the creator asked for one.
    pub spoof_to: Option<String>,
}

impl DeployConfig {
    /// Builds a config from a draft, deriving the name from the symbol when unset.
    ///
    /// Returns `None` when the draft has no symbol. No validation happens here.
    pub fn from_draft(draft: &TokenDraft, token_admin: impl Into<String>) -> Option<Self> {
        let draft = draft.normalized();
        let symbol = draft.symbol.clone()?;
        Some(Self {
            name: draft.derived_name().unwrap_or(&symbol).to_string(),
            symbol,
            image: draft.image,
            description: draft.description,
            token_admin: token_admin.into(),
            fees: draft.fees,
            context: draft.context,
            socials: draft.socials,
            spoof_to: draft.spoof_to,
        })
    }
}

/// What the deployer reported back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeployOutcome {
    pub success: bool,
    pub address: Option<String>,
    pub tx_hash: Option<String>,
    pub scan_url: Option<String>,
    pub error: Option<String>,
}

impl DeployOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Performs the actual token deployment.
///
/// Implementations own their retry, gas, and chain semantics. Failures are
/// reported through [`DeployOutcome::error`] rather than as `Err`.
#[async_trait]
pub trait TokenDeployer: Send + Sync {
    async fn deploy(&self, config: &DeployConfig) -> DeployOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_parses_partial_json() {
        let outcome: DeployOutcome =
            serde_json::from_str(r#"{"success": true, "address": "0x1", "txHash": "0x2"}"#)
                .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.tx_hash.as_deref(), Some("0x2"));
        assert!(outcome.scan_url.is_none());
    }

    #[test]
    fn config_name_falls_back_to_symbol() {
        let draft = TokenDraft {
            symbol: Some(" $MCAT ".to_string()),
            fees: Fees::new(100, 50),
            ..TokenDraft::default()
        };
        let config = DeployConfig::from_draft(&draft, "0xadmin").unwrap();
        assert_eq!(config.name, "MCAT");
        assert_eq!(config.symbol, "MCAT");
        assert_eq!(config.fees, Fees::new(100, 50));
        assert_eq!(config.token_admin, "0xadmin");
    }

    #[test]
    fn config_needs_a_symbol() {
        assert!(DeployConfig::from_draft(&TokenDraft::default(), "0xadmin").is_none());
    }

    #[test]
    fn failed_outcome_carries_error() {
        let outcome = DeployOutcome::failed("insufficient funds");
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("insufficient funds"));
    }
}
