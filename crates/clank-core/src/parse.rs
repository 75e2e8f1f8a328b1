//! Parsers for user-typed field values.
//!
//! Every parser returns an [`InputError`] on bad input; the conversation
//! reports it with [`InputError::hint`] and leaves the session where it was.

use std::sync::LazyLock;

use clank_proto::{Fees, MAX_FEE_BPS, TokenDraft};
use regex::Regex;
use thiserror::Error;

pub const MAX_NAME_CHARS: usize = 64;
pub const MAX_SYMBOL_CHARS: usize = 16;
pub const MAX_DESCRIPTION_CHARS: usize = 500;
pub const MAX_PRESET_NAME_CHARS: usize = 32;

static CID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(Qm[1-9A-HJ-NP-Za-km-z]{44}|b[a-z2-7]{50,})$").expect("static regex")
});
static ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("static regex"));

/// Malformed user input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("name must be 1-{MAX_NAME_CHARS} characters")]
    Name,

    #[error("{0:?} is not a valid symbol")]
    Symbol(String),

    #[error("couldn't read fees from {0:?}")]
    Fees(String),

    #[error("fee of {0} bps is above the {MAX_FEE_BPS} bps maximum")]
    FeeTooHigh(u32),

    #[error("{0:?} is not an image reference")]
    Image(String),

    #[error("{0:?} is not a 0x address")]
    Address(String),

    #[error("description must be at most {MAX_DESCRIPTION_CHARS} characters")]
    Description,

    #[error("no post or cast link found")]
    Context,

    #[error("{0:?} is not a usable preset name")]
    PresetName(String),
}

impl InputError {
    /// Corrective hint shown to the user.
    pub fn hint(&self) -> &'static str {
        match self {
            Self::Name => "Send a name between 1 and 64 characters.",
            Self::Symbol(_) => "Send a ticker of 1-16 letters or digits, e.g. <code>MCAT</code>.",
            Self::Fees(_) => {
                "Send one fee for both sides (<code>1%</code>) or two (<code>1% 0.5%</code>). Basis points work too: <code>100bps</code>."
            }
            Self::FeeTooHigh(_) => "Each side can be at most 20%.",
            Self::Image(_) => {
                "Send an <code>ipfs://</code> link, a bare CID, or an https image URL."
            }
            Self::Address(_) => "Send a 0x-prefixed address with 40 hex characters.",
            Self::Description => "Keep the description under 500 characters.",
            Self::Context => "Send an x.com status link or a Warpcast cast link, or /skip.",
            Self::PresetName(_) => {
                "Preset names are 1-32 characters and can't contain <code>:</code>."
            }
        }
    }
}

/// A single field assignment parsed from free text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldUpdate {
    Name(String),
    Symbol(String),
    Fees(Fees),
    Image(String),
    Description(String),
    SpoofTo(Option<String>),
}

impl FieldUpdate {
    pub fn apply(self, draft: &mut TokenDraft) {
        match self {
            Self::Name(name) => draft.name = Some(name),
            Self::Symbol(symbol) => draft.symbol = Some(symbol),
            Self::Fees(fees) => draft.fees = fees,
            Self::Image(image) => draft.image = Some(image),
            Self::Description(text) => draft.description = Some(text),
            Self::SpoofTo(address) => draft.spoof_to = address,
        }
    }

    pub fn field_name(&self) -> &'static str {
        match self {
            Self::Name(_) => "name",
            Self::Symbol(_) => "symbol",
            Self::Fees(_) => "fees",
            Self::Image(_) => "image",
            Self::Description(_) => "description",
            Self::SpoofTo(_) => "spoof",
        }
    }
}

pub fn parse_name(text: &str) -> Result<String, InputError> {
    let name = text.trim();
    let len = name.chars().count();
    if len == 0 || len > MAX_NAME_CHARS {
        return Err(InputError::Name);
    }
    Ok(name.to_string())
}

pub fn parse_symbol(text: &str) -> Result<String, InputError> {
    let symbol = text.trim().trim_start_matches('$').trim();
    let len = symbol.chars().count();
    if len == 0 || len > MAX_SYMBOL_CHARS || !symbol.chars().all(char::is_alphanumeric) {
        return Err(InputError::Symbol(text.trim().to_string()));
    }
    Ok(symbol.to_string())
}

/// Parses one fee (both sides) or two fees (clanker side, paired side).
///
/// Values are percentages unless suffixed with `bps`.
pub fn parse_fees(text: &str) -> Result<Fees, InputError> {
    let parts: Vec<&str> = text
        .split(|c: char| c.is_whitespace() || c == '/' || c == ',')
        .filter(|p| !p.is_empty())
        .collect();

    let bad = || InputError::Fees(text.trim().to_string());
    let values = match parts.as_slice() {
        [one] => {
            let bps = parse_fee_value(one).ok_or_else(bad)?;
            (bps, bps)
        }
        [clanker, paired] => (
            parse_fee_value(clanker).ok_or_else(bad)?,
            parse_fee_value(paired).ok_or_else(bad)?,
        ),
        _ => return Err(bad()),
    };

    for bps in [values.0, values.1] {
        if bps > MAX_FEE_BPS {
            return Err(InputError::FeeTooHigh(bps));
        }
    }
    Ok(Fees::new(values.0, values.1))
}

fn parse_fee_value(raw: &str) -> Option<u32> {
    let raw = raw.trim().to_lowercase();
    if let Some(bps) = raw.strip_suffix("bps") {
        return bps.trim().parse().ok();
    }
    let percent: f64 = raw.trim_end_matches('%').trim().parse().ok()?;
    if !percent.is_finite() || percent < 0.0 || percent > 100.0 {
        return None;
    }
    Some((percent * 100.0).round() as u32)
}

/// Accepts `ipfs://<cid>`, a bare CID (stored as `ipfs://<cid>`), or an http(s) URL.
pub fn parse_image_ref(text: &str) -> Result<String, InputError> {
    let value = text.trim();
    let bad = || InputError::Image(value.to_string());
    if value.is_empty() || value.chars().any(char::is_whitespace) {
        return Err(bad());
    }
    if let Some(cid) = value.strip_prefix("ipfs://") {
        return if cid.is_empty() { Err(bad()) } else { Ok(value.to_string()) };
    }
    if CID.is_match(value) {
        return Ok(format!("ipfs://{value}"));
    }
    let lower = value.to_lowercase();
    if (lower.starts_with("https://") || lower.starts_with("http://")) && value.len() > 10 {
        return Ok(value.to_string());
    }
    Err(bad())
}

/// True when `text` looks like something [`parse_image_ref`] would accept
/// as an image rather than a page link.
pub fn looks_like_image(text: &str) -> bool {
    let lower = text.trim().to_lowercase();
    lower.starts_with("ipfs://")
        || CID.is_match(text.trim())
        || lower.contains("/ipfs/")
        || [".png", ".jpg", ".jpeg", ".gif", ".webp", ".svg"]
            .iter()
            .any(|ext| lower.split(['?', '#']).next().unwrap_or("").ends_with(ext))
}

pub fn parse_address(text: &str) -> Result<String, InputError> {
    let value = text.trim();
    if ADDRESS.is_match(value) {
        Ok(value.to_string())
    } else {
        Err(InputError::Address(value.to_string()))
    }
}

pub fn parse_description(text: &str) -> Result<String, InputError> {
    let value = text.trim();
    if value.is_empty() || value.chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(InputError::Description);
    }
    Ok(value.to_string())
}

pub fn parse_preset_name(text: &str) -> Result<String, InputError> {
    let value = text.trim();
    let len = value.chars().count();
    if len == 0 || len > MAX_PRESET_NAME_CHARS || value.contains(':') {
        return Err(InputError::PresetName(value.to_string()));
    }
    Ok(value.to_string())
}

/// Parses `key: value` lines (and a lone `$TICKER`) from a free-form message.
///
/// Lines with unknown keys are ignored. An empty result means the message
/// carried no field assignments.
pub fn parse_field_lines(text: &str) -> Result<Vec<FieldUpdate>, InputError> {
    let mut updates = Vec::new();
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some((key, value)) = line.split_once(':') {
            let value = value.trim();
            let update = match key.trim().to_lowercase().as_str() {
                "name" => FieldUpdate::Name(parse_name(value)?),
                "symbol" | "ticker" => FieldUpdate::Symbol(parse_symbol(value)?),
                "fees" | "fee" => FieldUpdate::Fees(parse_fees(value)?),
                "image" | "img" => FieldUpdate::Image(parse_image_ref(value)?),
                "description" | "desc" => FieldUpdate::Description(parse_description(value)?),
                "spoof" | "spoof_to" | "spoofto" => FieldUpdate::SpoofTo(parse_spoof(value)?),
                _ => continue,
            };
            updates.push(update);
        } else if line.starts_with('$') && !line.contains(char::is_whitespace) {
            updates.push(FieldUpdate::Symbol(parse_symbol(line)?));
        }
    }
    Ok(updates)
}

/// A spoof target, or `None` when the user asked to clear it.
pub fn parse_spoof(text: &str) -> Result<Option<String>, InputError> {
    match text.trim().to_lowercase().as_str() {
        "none" | "clear" | "off" | "-" => Ok(None),
        _ => parse_address(text).map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fees_single_value_applies_to_both_sides() {
        assert_eq!(parse_fees("1%").unwrap(), Fees::new(100, 100));
        assert_eq!(parse_fees("2").unwrap(), Fees::new(200, 200));
    }

    #[test]
    fn fees_two_values_with_separators() {
        assert_eq!(parse_fees("1% 0.5%").unwrap(), Fees::new(100, 50));
        assert_eq!(parse_fees("1/0.25").unwrap(), Fees::new(100, 25));
        assert_eq!(parse_fees("3%, 0%").unwrap(), Fees::new(300, 0));
        assert_eq!(parse_fees("150bps 75bps").unwrap(), Fees::new(150, 75));
    }

    #[test]
    fn fees_reject_garbage_and_excess() {
        assert!(matches!(parse_fees("lots"), Err(InputError::Fees(_))));
        assert!(matches!(parse_fees("1 2 3"), Err(InputError::Fees(_))));
        assert!(matches!(parse_fees("-1%"), Err(InputError::Fees(_))));
        assert_eq!(parse_fees("25%").unwrap_err(), InputError::FeeTooHigh(2500));
    }

    #[test]
    fn symbol_strips_dollar_and_rejects_spaces() {
        assert_eq!(parse_symbol("$MCAT").unwrap(), "MCAT");
        assert!(parse_symbol("MO ON").is_err());
        assert!(parse_symbol("").is_err());
        assert!(parse_symbol("ABCDEFGHIJKLMNOPQ").is_err());
    }

    #[test]
    fn image_refs() {
        assert_eq!(
            parse_image_ref("ipfs://bafkreiabc").unwrap(),
            "ipfs://bafkreiabc"
        );
        let cid = "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG";
        assert_eq!(parse_image_ref(cid).unwrap(), format!("ipfs://{cid}"));
        assert_eq!(
            parse_image_ref("https://cdn.example/cat.png").unwrap(),
            "https://cdn.example/cat.png"
        );
        assert!(parse_image_ref("ipfs://").is_err());
        assert!(parse_image_ref("a cat picture").is_err());
    }

    #[test]
    fn image_detection() {
        assert!(looks_like_image("https://cdn.example/cat.PNG?size=2"));
        assert!(looks_like_image("https://gateway.example/ipfs/bafy"));
        assert!(!looks_like_image("https://x.com/mooncat"));
    }

    #[test]
    fn addresses() {
        let addr = "0x00000000000000000000000000000000000000aB";
        assert_eq!(parse_address(addr).unwrap(), addr);
        assert!(parse_address("0x123").is_err());
        assert_eq!(parse_spoof("none").unwrap(), None);
        assert_eq!(parse_spoof(addr).unwrap().as_deref(), Some(addr));
    }

    #[test]
    fn field_lines() {
        let updates = parse_field_lines("name: Moon Cat\nticker: MCAT\nfees: 1% 0.5%\ncolor: blue").unwrap();
        assert_eq!(
            updates,
            vec![
                FieldUpdate::Name("Moon Cat".into()),
                FieldUpdate::Symbol("MCAT".into()),
                FieldUpdate::Fees(Fees::new(100, 50)),
            ]
        );
    }

    #[test]
    fn field_lines_lone_ticker() {
        assert_eq!(
            parse_field_lines("$MCAT").unwrap(),
            vec![FieldUpdate::Symbol("MCAT".into())]
        );
        assert!(parse_field_lines("hello there").unwrap().is_empty());
    }

    #[test]
    fn field_lines_surface_bad_values() {
        assert!(matches!(
            parse_field_lines("fees: whatever"),
            Err(InputError::Fees(_))
        ));
    }

    #[test]
    fn preset_names() {
        assert_eq!(parse_preset_name(" cats ").unwrap(), "cats");
        assert!(parse_preset_name("a:b").is_err());
        assert!(parse_preset_name("").is_err());
    }
}
