//! The token draft a chat builds up before deploying.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Fee applied to either side of the pool when none was given, in basis points.
pub const DEFAULT_FEE_BPS: u32 = 100;

/// Upper bound for a single side of the fee pair, in basis points (20%).
pub const MAX_FEE_BPS: u32 = 2000;

/// Creator fee pair in basis points.
///
/// Both values are always finite non-negative integers: anything else found
/// on disk or on the wire is replaced by [`DEFAULT_FEE_BPS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fees {
    #[serde(default = "default_fee", deserialize_with = "lenient_fee")]
    pub clanker_fee: u32,
    #[serde(default = "default_fee", deserialize_with = "lenient_fee")]
    pub paired_fee: u32,
}

impl Fees {
    pub fn new(clanker_fee: u32, paired_fee: u32) -> Self {
        Self {
            clanker_fee,
            paired_fee,
        }
    }

    /// True when both sides are within [`MAX_FEE_BPS`].
    pub fn is_valid(&self) -> bool {
        self.clanker_fee <= MAX_FEE_BPS && self.paired_fee <= MAX_FEE_BPS
    }

    /// Human form, e.g. `1% / 0.5%`.
    pub fn display(&self) -> String {
        format!(
            "{} / {}",
            bps_to_percent(self.clanker_fee),
            bps_to_percent(self.paired_fee)
        )
    }
}

impl Default for Fees {
    fn default() -> Self {
        Self::new(DEFAULT_FEE_BPS, DEFAULT_FEE_BPS)
    }
}

fn bps_to_percent(bps: u32) -> String {
    if bps % 100 == 0 {
        format!("{}%", bps / 100)
    } else {
        let text = format!("{:.2}", f64::from(bps) / 100.0);
        format!("{}%", text.trim_end_matches('0'))
    }
}

fn default_fee() -> u32 {
    DEFAULT_FEE_BPS
}

fn lenient_fee<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawFee {
        Int(i64),
        Float(f64),
        Text(String),
        Other(serde::de::IgnoredAny),
    }

    let fee = match RawFee::deserialize(deserializer)? {
        RawFee::Int(value) => u32::try_from(value).ok(),
        RawFee::Float(value) if value.is_finite() && value >= 0.0 && value <= f64::from(u32::MAX) => {
            Some(value.round() as u32)
        }
        RawFee::Text(text) => text.trim().parse::<u32>().ok(),
        RawFee::Float(_) | RawFee::Other(_) => None,
    };
    Ok(fee.unwrap_or(DEFAULT_FEE_BPS))
}

/// Where the deployment was requested from (a post or cast the token references).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DraftContext {
    pub platform: Option<String>,
    pub message_id: Option<String>,
}

impl DraftContext {
    pub fn new(platform: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self {
            platform: Some(platform.into()),
            message_id: Some(message_id.into()),
        }
    }

    pub fn is_set(&self) -> bool {
        self.platform.is_some() && self.message_id.is_some()
    }
}

/// The in-progress token configuration owned by one chat session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TokenDraft {
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub image: Option<String>,
    pub description: Option<String>,
    pub fees: Fees,
    pub context: DraftContext,
    pub socials: BTreeMap<String, String>,
    pub spoof_to: Option<String>,
}

impl TokenDraft {
    /// The name to deploy under: the explicit name, else the symbol.
    pub fn derived_name(&self) -> Option<&str> {
        self.name.as_deref().or(self.symbol.as_deref())
    }

    /// Returns a copy with whitespace trimmed, blanks dropped, and keys canonicalised.
    ///
    /// This is the form the draft store persists and compares against.
    pub fn normalized(&self) -> Self {
        Self {
            name: clean(self.name.as_deref()),
            symbol: clean(self.symbol.as_deref().map(|s| s.trim().trim_start_matches('$'))),
            image: clean(self.image.as_deref()),
            description: clean(self.description.as_deref()),
            fees: self.fees,
            context: DraftContext {
                platform: clean(self.context.platform.as_deref()).map(|p| p.to_lowercase()),
                message_id: clean(self.context.message_id.as_deref()),
            },
            socials: self
                .socials
                .iter()
                .filter_map(|(platform, url)| {
                    let platform = clean(Some(platform))?.to_lowercase();
                    let url = clean(Some(url))?;
                    Some((platform, url))
                })
                .collect(),
            spoof_to: clean(self.spoof_to.as_deref()),
        }
    }

    /// True when nothing but default fees has been entered.
    pub fn is_blank(&self) -> bool {
        self.normalized() == Self::default()
    }
}

fn clean(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}
