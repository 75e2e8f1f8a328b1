//! Default [`LinkExtractor`]: recognises post/cast URLs and social profiles.

use clank_proto::{DraftContext, ExtractedLinks, LinkExtractor};
use regex::Regex;

use crate::parse::looks_like_image;

/// Path segments on x.com that are app routes rather than profiles.
const RESERVED_X_PATHS: &[&str] = &[
    "home", "i", "search", "explore", "settings", "messages", "notifications", "intent", "share",
];

/// A context rule turns a matching URL into the post/cast the deploy references.
struct ContextRule {
    platform: &'static str,
    hosts: &'static [&'static str],
    /// Capture group 1 is the message id.
    path: Regex,
}

/// A social rule turns a matching URL into a profile link.
struct SocialRule {
    platform: &'static str,
    hosts: &'static [&'static str],
    path: Regex,
    /// Canonical prefix the captured handle is appended to.
    base: &'static str,
}

/// Regex-driven link extractor compiled once at construction.
pub struct RegexLinkExtractor {
    url: Regex,
    labelled_site: Regex,
    context_rules: Vec<ContextRule>,
    social_rules: Vec<SocialRule>,
}

impl Default for RegexLinkExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl RegexLinkExtractor {
    pub fn new() -> Self {
        let compile = |pattern: &str| Regex::new(pattern).expect("static regex");
        Self {
            url: compile(
                r#"(?i)(https?://)?(?:www\.)?([a-z0-9-]+(?:\.[a-z0-9-]+)+)(/[^\s<>"']*)?"#,
            ),
            labelled_site: compile(r"(?im)^\s*(?:website|site|web)\s*:\s*(\S+)"),
            context_rules: vec![
                ContextRule {
                    platform: "twitter",
                    hosts: &["x.com", "twitter.com", "mobile.twitter.com"],
                    path: compile(r"^/[A-Za-z0-9_]+/status(?:es)?/(\d+)"),
                },
                ContextRule {
                    platform: "farcaster",
                    hosts: &["warpcast.com", "farcaster.xyz"],
                    path: compile(r"^/[A-Za-z0-9_.-]+/(0x[0-9a-fA-F]{6,})"),
                },
            ],
            social_rules: vec![
                SocialRule {
                    platform: "x",
                    hosts: &["x.com", "twitter.com"],
                    path: compile(r"^/([A-Za-z0-9_]{1,15})/?$"),
                    base: "https://x.com",
                },
                SocialRule {
                    platform: "telegram",
                    hosts: &["t.me", "telegram.me"],
                    path: compile(r"^/([A-Za-z0-9_+]{3,})/?$"),
                    base: "https://t.me",
                },
                SocialRule {
                    platform: "discord",
                    hosts: &["discord.gg", "discord.com"],
                    path: compile(r"^/(?:invite/)?([A-Za-z0-9-]+)/?$"),
                    base: "https://discord.gg",
                },
                SocialRule {
                    platform: "github",
                    hosts: &["github.com"],
                    path: compile(r"^/([A-Za-z0-9-]+(?:/[A-Za-z0-9_.-]+)?)/?$"),
                    base: "https://github.com",
                },
                SocialRule {
                    platform: "farcaster",
                    hosts: &["warpcast.com", "farcaster.xyz"],
                    path: compile(r"^/([A-Za-z0-9_.-]+)/?$"),
                    base: "https://warpcast.com",
                },
            ],
        }
    }

    fn known_host(&self, host: &str) -> bool {
        self.context_rules.iter().any(|r| r.hosts.contains(&host))
            || self.social_rules.iter().any(|r| r.hosts.contains(&host))
    }

    fn classify(&self, host: &str, path: &str, found: &mut ExtractedLinks) {
        for rule in &self.context_rules {
            if !rule.hosts.contains(&host) {
                continue;
            }
            if let Some(caps) = rule.path.captures(path) {
                if found.context.is_none() {
                    found.context = Some(DraftContext::new(rule.platform, &caps[1]));
                }
                return;
            }
        }

        for rule in &self.social_rules {
            if !rule.hosts.contains(&host) {
                continue;
            }
            let Some(caps) = rule.path.captures(path) else {
                continue;
            };
            let handle = &caps[1];
            if rule.platform == "x" && RESERVED_X_PATHS.contains(&handle.to_lowercase().as_str()) {
                continue;
            }
            found
                .socials
                .entry(rule.platform.to_string())
                .or_insert_with(|| format!("{}/{handle}", rule.base));
            return;
        }
    }
}

impl LinkExtractor for RegexLinkExtractor {
    fn extract(&self, text: &str) -> ExtractedLinks {
        let mut found = ExtractedLinks::default();

        for caps in self.url.captures_iter(text) {
            let whole = caps.get(0).map_or("", |m| m.as_str());
            if looks_like_image(whole) {
                continue;
            }
            let has_scheme = caps.get(1).is_some();
            let host = caps[2].to_lowercase();
            if !has_scheme && !self.known_host(&host) {
                continue;
            }
            let path = caps.get(3).map_or("", |m| m.as_str());
            let path = path.split(['?', '#']).next().unwrap_or("");
            self.classify(&host, path, &mut found);
        }

        if let Some(caps) = self.labelled_site.captures(text) {
            let raw = caps[1].trim_end_matches('/');
            if !looks_like_image(raw) && raw.contains('.') {
                let url = if raw.starts_with("http://") || raw.starts_with("https://") {
                    raw.to_string()
                } else {
                    format!("https://{raw}")
                };
                found.socials.entry("website".to_string()).or_insert(url);
            }
        }

        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(text: &str) -> ExtractedLinks {
        RegexLinkExtractor::new().extract(text)
    }

    #[test]
    fn twitter_status_becomes_context() {
        let links = extract("deploy this https://x.com/mooncat/status/1790000000000000001?s=20");
        assert_eq!(
            links.context,
            Some(DraftContext::new("twitter", "1790000000000000001"))
        );
        assert!(links.socials.is_empty());
    }

    #[test]
    fn warpcast_cast_becomes_context() {
        let links = extract("warpcast.com/dwr/0xabc123ef");
        assert_eq!(links.context, Some(DraftContext::new("farcaster", "0xabc123ef")));
    }

    #[test]
    fn profiles_become_socials() {
        let links = extract(
            "https://x.com/mooncat\nhttps://t.me/mooncat_portal\nhttps://discord.gg/abc123\ngithub.com/mooncat/contracts",
        );
        assert_eq!(links.socials["x"], "https://x.com/mooncat");
        assert_eq!(links.socials["telegram"], "https://t.me/mooncat_portal");
        assert_eq!(links.socials["discord"], "https://discord.gg/abc123");
        assert_eq!(links.socials["github"], "https://github.com/mooncat/contracts");
        assert!(links.context.is_none());
    }

    #[test]
    fn labelled_website() {
        let links = extract("website: moon.cat");
        assert_eq!(links.socials["website"], "https://moon.cat");
    }

    #[test]
    fn unlabelled_unknown_sites_and_images_are_ignored() {
        assert!(extract("https://moon.cat").is_empty());
        assert!(extract("https://cdn.example/cat.png").is_empty());
        assert!(extract("image: https://x.com/media/cat.jpg").is_empty());
    }

    #[test]
    fn plain_text_and_fee_numbers_are_not_links() {
        assert!(extract("fees: 1% 0.5%").is_empty());
        assert!(extract("name: Moon Cat").is_empty());
        assert!(extract("https://x.com/home").is_empty());
    }
}
