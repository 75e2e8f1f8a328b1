//! Text utilities for chat output.
//!
//! This module provides the HTML escaping, markup stripping, and UTF-8 safe
//! length capping used when rendering and delivering messages.

use std::sync::LazyLock;

use regex::Regex;

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?[a-zA-Z][^>]*>").expect("static regex"));

/// Escape special HTML characters for Telegram's HTML parse mode.
///
/// Telegram requires `<`, `>`, and `&` to be escaped in HTML-formatted messages.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Remove HTML markup and decode the entities [`escape_html`] produces.
///
/// Used to degrade a rich message to plain text when the API rejects its markup.
pub fn strip_html(text: &str) -> String {
    HTML_TAG
        .replace_all(text, "")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
}

/// The marker appended to a capped message.
pub fn truncation_marker(dropped: usize) -> String {
    format!("\n[truncated {dropped} chars]")
}

/// Caps `text` at `max_chars` characters, appending a `[truncated N chars]` marker.
///
/// `N` is exactly the number of characters removed from `text`, and the
/// result including the marker fits in `max_chars` whenever the cap is
/// wider than the marker itself. Counting is by `char`, never by byte, so
/// multi-byte characters are never split.
pub fn truncate_with_marker(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }

    let marker_len = |dropped: usize| truncation_marker(dropped).chars().count();

    // The marker widens with the digit count of the dropped total; start from
    // the widest possible marker and grow the kept prefix while it still fits.
    let mut keep = max_chars.saturating_sub(marker_len(total));
    while keep + 1 < total && keep + 1 + marker_len(total - keep - 1) <= max_chars {
        keep += 1;
    }

    let byte_idx = text
        .char_indices()
        .nth(keep)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len());
    format!("{}{}", &text[..byte_idx], truncation_marker(total - keep))
}

/// Truncates a string to a maximum number of characters, adding "..." if truncated.
pub fn truncate_with_ellipsis(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let byte_idx = s
            .char_indices()
            .nth(max_chars)
            .map(|(idx, _)| idx)
            .unwrap_or(s.len());
        format!("{}...", &s[..byte_idx])
    }
}
