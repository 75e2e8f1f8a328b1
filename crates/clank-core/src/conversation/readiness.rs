//! The deploy readiness check shared by every path that mutates a draft.

use clank_proto::TokenDraft;

/// Which fields stand between a draft and a deploy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyStatus {
    pub ready: bool,
    /// Required fields that are missing or invalid.
    pub missing: Vec<&'static str>,
    /// Optional fields that are still unset.
    pub optional_unset: Vec<&'static str>,
}

/// A draft is ready once it has a symbol (the name derives from it) and a
/// valid fee pair. Image and context are optional.
pub fn get_ready_status(draft: &TokenDraft) -> ReadyStatus {
    let draft = draft.normalized();

    let mut missing = Vec::new();
    if draft.symbol.is_none() {
        missing.push("symbol");
    } else if draft.derived_name().is_none() {
        missing.push("name");
    }
    if !draft.fees.is_valid() {
        missing.push("fees");
    }

    let mut optional_unset = Vec::new();
    if draft.image.is_none() {
        optional_unset.push("image");
    }
    if !draft.context.is_set() {
        optional_unset.push("context");
    }

    ReadyStatus {
        ready: missing.is_empty(),
        missing,
        optional_unset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clank_proto::{DraftContext, Fees};

    #[test]
    fn blank_draft_needs_a_symbol() {
        let status = get_ready_status(&TokenDraft::default());
        assert!(!status.ready);
        assert_eq!(status.missing, ["symbol"]);
        assert_eq!(status.optional_unset, ["image", "context"]);
    }

    #[test]
    fn symbol_with_default_fees_is_ready() {
        let draft = TokenDraft {
            symbol: Some("MCAT".to_string()),
            ..TokenDraft::default()
        };
        assert!(get_ready_status(&draft).ready);
    }

    #[test]
    fn whitespace_symbol_does_not_count() {
        let draft = TokenDraft {
            symbol: Some("  ".to_string()),
            ..TokenDraft::default()
        };
        assert_eq!(get_ready_status(&draft).missing, ["symbol"]);
    }

    #[test]
    fn out_of_range_fees_block_readiness() {
        let draft = TokenDraft {
            symbol: Some("MCAT".to_string()),
            fees: Fees::new(100, 5000),
            ..TokenDraft::default()
        };
        let status = get_ready_status(&draft);
        assert!(!status.ready);
        assert_eq!(status.missing, ["fees"]);
    }

    #[test]
    fn optional_fields_are_reported_separately() {
        let draft = TokenDraft {
            symbol: Some("MCAT".to_string()),
            image: Some("ipfs://bafy".to_string()),
            context: DraftContext::new("twitter", "1"),
            ..TokenDraft::default()
        };
        let status = get_ready_status(&draft);
        assert!(status.ready);
        assert!(status.optional_unset.is_empty());
    }
}
