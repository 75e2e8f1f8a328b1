//! Building and validating the [`DeployConfig`] handed to the deployer.
//!
//! Validation reports its observations as [`ValidationNote`]s alongside the
//! config instead of printing them, so the bot and the CLI render them their
//! own way.

use clank_proto::{DeployConfig, MAX_FEE_BPS, TokenDraft};
use thiserror::Error;

use crate::parse::{parse_address, parse_image_ref, parse_name, parse_symbol};

/// A config that cannot be deployed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("the draft has no symbol")]
    MissingSymbol,

    #[error("no deployer address is configured")]
    MissingDeployer,

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("{side} fee of {bps} bps exceeds the {MAX_FEE_BPS} bps maximum")]
    FeeTooHigh { side: &'static str, bps: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NoteLevel {
    Info,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationNote {
    pub level: NoteLevel,
    pub message: String,
}

impl ValidationNote {
    fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoteLevel::Info,
            message: message.into(),
        }
    }

    fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoteLevel::Warning,
            message: message.into(),
        }
    }
}

/// A config that passed validation, with what the validator noticed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validated {
    pub config: DeployConfig,
    pub notes: Vec<ValidationNote>,
}

impl Validated {
    pub fn warnings(&self) -> impl Iterator<Item = &ValidationNote> {
        self.notes.iter().filter(|n| n.level == NoteLevel::Warning)
    }
}

/// Builds a deploy config from a session draft.
pub fn create_config_from_session(
    draft: &TokenDraft,
    deployer_address: Option<&str>,
) -> Result<DeployConfig, ConfigError> {
    let deployer = deployer_address
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .ok_or(ConfigError::MissingDeployer)?;
    DeployConfig::from_draft(draft, deployer).ok_or(ConfigError::MissingSymbol)
}

/// Checks a config for deployability and normalises its image reference.
pub fn validate_config(mut config: DeployConfig) -> Result<Validated, ConfigError> {
    let invalid = |field: &'static str| {
        move |e: crate::parse::InputError| ConfigError::Invalid {
            field,
            reason: e.to_string(),
        }
    };

    config.name = parse_name(&config.name).map_err(invalid("name"))?;
    config.symbol = parse_symbol(&config.symbol).map_err(invalid("symbol"))?;
    config.token_admin = parse_address(&config.token_admin).map_err(invalid("token admin"))?;

    for (side, bps) in [
        ("clanker", config.fees.clanker_fee),
        ("paired", config.fees.paired_fee),
    ] {
        if bps > MAX_FEE_BPS {
            return Err(ConfigError::FeeTooHigh { side, bps });
        }
    }

    if let Some(image) = config.image.as_deref() {
        config.image = Some(parse_image_ref(image).map_err(invalid("image"))?);
    }
    if let Some(spoof) = config.spoof_to.as_deref() {
        config.spoof_to = Some(parse_address(spoof).map_err(invalid("spoof address"))?);
    }

    let mut notes = vec![ValidationNote::info(format!(
        "Fees {} (clanker / paired)",
        config.fees.display()
    ))];
    if config.image.is_none() {
        notes.push(ValidationNote::warning("No image set; the token deploys without one"));
    }
    if !config.context.is_set() {
        notes.push(ValidationNote::info("No post or cast linked as context"));
    }
    if let Some(spoof) = &config.spoof_to {
        if !spoof.eq_ignore_ascii_case(&config.token_admin) {
            notes.push(ValidationNote::warning(format!(
                "Creator rewards go to {spoof}, not the deployer"
            )));
        }
    }
    if config.fees.clanker_fee == 0 && config.fees.paired_fee == 0 {
        notes.push(ValidationNote::warning("Both fees are zero; no creator rewards accrue"));
    }

    Ok(Validated { config, notes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clank_proto::{DraftContext, Fees};

    const ADMIN: &str = "0x1111111111111111111111111111111111111111";
    const OTHER: &str = "0x2222222222222222222222222222222222222222";

    fn ready_draft() -> TokenDraft {
        TokenDraft {
            symbol: Some("MCAT".to_string()),
            fees: Fees::new(100, 50),
            ..TokenDraft::default()
        }
    }

    #[test]
    fn missing_deployer_is_an_error() {
        assert_eq!(
            create_config_from_session(&ready_draft(), None).unwrap_err(),
            ConfigError::MissingDeployer
        );
        assert_eq!(
            create_config_from_session(&ready_draft(), Some("  ")).unwrap_err(),
            ConfigError::MissingDeployer
        );
    }

    #[test]
    fn missing_symbol_is_an_error() {
        assert_eq!(
            create_config_from_session(&TokenDraft::default(), Some(ADMIN)).unwrap_err(),
            ConfigError::MissingSymbol
        );
    }

    #[test]
    fn minimal_draft_validates_with_notes() {
        let config = create_config_from_session(&ready_draft(), Some(ADMIN)).unwrap();
        let validated = validate_config(config).unwrap();

        assert_eq!(validated.config.name, "MCAT");
        assert_eq!(validated.notes[0].message, "Fees 1% / 0.5% (clanker / paired)");
        assert_eq!(validated.warnings().count(), 1);
        assert!(
            validated
                .notes
                .iter()
                .any(|n| n.message.contains("No post or cast"))
        );
    }

    #[test]
    fn bare_cid_image_is_normalised() {
        let mut draft = ready_draft();
        draft.image = Some("bafkreigh2akiscaildcqabsyg3dfr6chu3fgpregiymsck7e7aqa4s52zy".to_string());
        draft.context = DraftContext::new("twitter", "1");
        let config = create_config_from_session(&draft, Some(ADMIN)).unwrap();
        let validated = validate_config(config).unwrap();

        assert!(validated.config.image.as_deref().unwrap().starts_with("ipfs://baf"));
        assert_eq!(validated.warnings().count(), 0);
    }

    #[test]
    fn spoof_target_is_flagged() {
        let mut draft = ready_draft();
        draft.spoof_to = Some(OTHER.to_string());
        let config = create_config_from_session(&draft, Some(ADMIN)).unwrap();
        let validated = validate_config(config).unwrap();
        assert!(validated.warnings().any(|n| n.message.contains(OTHER)));
    }

    #[test]
    fn bad_admin_and_fees_are_rejected() {
        let config = create_config_from_session(&ready_draft(), Some("0xnope")).unwrap();
        assert!(matches!(
            validate_config(config),
            Err(ConfigError::Invalid { field: "token admin", .. })
        ));

        let mut config = create_config_from_session(&ready_draft(), Some(ADMIN)).unwrap();
        config.fees = Fees::new(2500, 0);
        assert_eq!(
            validate_config(config).unwrap_err(),
            ConfigError::FeeTooHigh {
                side: "clanker",
                bps: 2500
            }
        );
    }
}
