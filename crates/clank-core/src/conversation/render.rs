//! Telegram HTML for everything the conversation says.
//!
//! User-supplied values are always escaped with [`escape_html`].

use clank_proto::{Button, DeployConfig, DeployOutcome, Keyboard, TokenDraft};

use crate::deploy_config::{NoteLevel, ValidationNote};
use crate::draft_store::PresetSummary;
use crate::parse::InputError;
use crate::session::ConversationState;
use crate::text::{escape_html, truncate_with_ellipsis};

use super::readiness::ReadyStatus;

pub const CONFIRM_YES: &str = "confirm:yes";
pub const CONFIRM_NO: &str = "confirm:no";
pub const WIZARD_START: &str = "wizard:start";
pub const MENU_PREFIX: &str = "menu:";
pub const PRESET_LOAD_PREFIX: &str = "preset:load:";
pub const PRESET_DELETE_PREFIX: &str = "preset:delete:";

pub fn welcome() -> String {
    [
        "🚀 <b>Clank token deployer</b>",
        "",
        "Send fields as <code>key: value</code> lines, paste an x.com or Warpcast link, or walk through /wizard.",
        "",
        "<code>name: Moon Cat</code>",
        "<code>symbol: MCAT</code>",
        "<code>fees: 1% 0.5%</code>",
        "",
        "/help lists every command.",
    ]
    .join("\n")
}

pub fn help() -> String {
    [
        "<b>Commands</b>",
        "",
        "/wizard - Step through every field",
        "/menu - Edit a single field",
        "/status - Show the draft and what's missing",
        "/deploy - Review and deploy",
        "/new - Start over with an empty draft",
        "/cancel - Cancel and clear the draft",
        "/save &lt;name&gt; - Save the draft as a preset",
        "/load &lt;name&gt; - Load a preset",
        "/delete &lt;name&gt; - Delete a preset",
        "/presets - List presets",
        "/help - This message",
        "",
        "<b>Fields</b>: name, symbol, fees, image, description, spoof",
    ]
    .join("\n")
}

pub fn field_menu() -> Keyboard {
    let button = |label: &str, field: &str| Button::new(label, format!("{MENU_PREFIX}{field}"));
    vec![
        vec![button("Name", "name"), button("Symbol", "symbol"), button("Fees", "fees")],
        vec![button("Image", "image"), button("Context", "context"), button("Spoof", "spoof")],
        vec![button("💾 Save", "save"), button("📂 Load", "load"), button("🗑 Delete", "delete")],
        vec![Button::new("🧙 Wizard", WIZARD_START)],
    ]
}

pub fn confirm_keyboard() -> Keyboard {
    vec![vec![
        Button::new("✅ Deploy", CONFIRM_YES),
        Button::new("✖️ Cancel", CONFIRM_NO),
    ]]
}

/// Field-by-field view of a draft.
pub fn draft_summary(draft: &TokenDraft) -> String {
    let value = |v: Option<&str>| match v {
        Some(v) => format!("<code>{}</code>", escape_html(v)),
        None => "<i>unset</i>".to_string(),
    };

    let mut lines = vec![
        format!("Name: {}", value(draft.derived_name())),
        format!("Symbol: {}", value(draft.symbol.as_deref())),
        format!("Fees: <code>{}</code>", draft.fees.display()),
        format!("Image: {}", value(draft.image.as_deref())),
    ];
    if let Some(description) = &draft.description {
        lines.push(format!(
            "Description: {}",
            escape_html(&truncate_with_ellipsis(description, 200))
        ));
    }
    let context = match (&draft.context.platform, &draft.context.message_id) {
        (Some(platform), Some(id)) => {
            format!("<code>{}</code> {}", escape_html(platform), escape_html(id))
        }
        _ => "<i>unset</i>".to_string(),
    };
    lines.push(format!("Context: {context}"));
    for (platform, url) in &draft.socials {
        lines.push(format!("{}: {}", escape_html(platform), escape_html(url)));
    }
    if let Some(spoof) = &draft.spoof_to {
        lines.push(format!("Rewards to: <code>{}</code>", escape_html(spoof)));
    }
    lines.join("\n")
}

pub fn confirm_prompt(draft: &TokenDraft) -> String {
    format!(
        "📋 <b>Ready to deploy</b>\n\n{}\n\nDeploy now? Reply <b>yes</b> or <b>no</b>.",
        draft_summary(draft)
    )
}

/// Replaces the confirm prompt once answered, dropping its buttons.
pub fn confirm_closed(draft: &TokenDraft, deploying: bool) -> String {
    let verdict = if deploying { "🚀 Deploying…" } else { "✖️ Cancelled" };
    format!("📋 <b>Deploy review</b>\n\n{}\n\n{verdict}", draft_summary(draft))
}

pub fn not_ready(status: &ReadyStatus) -> String {
    let mut text = format!("Still needed: <b>{}</b>", status.missing.join(", "));
    if !status.optional_unset.is_empty() {
        text.push_str(&format!("\nOptional: {}", status.optional_unset.join(", ")));
    }
    text
}

/// Draft view plus readiness, for `/status`.
pub fn status(state: ConversationState, draft: &TokenDraft, ready: &ReadyStatus) -> String {
    let mut text = format!(
        "<b>Draft</b> (<code>{}</code>)\n\n{}\n\n",
        state,
        draft_summary(draft)
    );
    if ready.ready {
        text.push_str("✅ Ready. Send /deploy to review.");
    } else {
        text.push_str(&not_ready(ready));
    }
    text
}

pub fn updated(field: &str) -> String {
    format!("✏️ Updated {field}.")
}

pub fn input_error(error: &InputError) -> String {
    format!("⚠️ {}\n{}", escape_html(&error.to_string()), error.hint())
}

pub fn wizard_prompt(step: ConversationState, draft: &TokenDraft) -> String {
    let current = |v: Option<&str>| {
        v.map(|v| format!("\nCurrent: <code>{}</code>", escape_html(v)))
            .unwrap_or_default()
    };
    match step {
        ConversationState::WizardName => format!(
            "🧙 <b>Step 1/5</b> What's the token name?{}\n/skip to use the symbol.",
            current(draft.name.as_deref())
        ),
        ConversationState::WizardSymbol => format!(
            "🧙 <b>Step 2/5</b> Ticker symbol?{}",
            current(draft.symbol.as_deref())
        ),
        ConversationState::WizardFees => format!(
            "🧙 <b>Step 3/5</b> Fees? One value for both sides or two (<code>1% 0.5%</code>).\nCurrent: <code>{}</code>\n/skip to keep it.",
            draft.fees.display()
        ),
        ConversationState::WizardImage => format!(
            "🧙 <b>Step 4/5</b> Send an image, an <code>ipfs://</code> link, or an https URL.{}\n/skip to leave it.",
            current(draft.image.as_deref())
        ),
        ConversationState::WizardContext => {
            "🧙 <b>Step 5/5</b> Link the x.com post or Warpcast cast this token is for.\n/skip to leave it."
                .to_string()
        }
        _ => String::new(),
    }
}

pub fn menu_prompt(state: ConversationState) -> &'static str {
    match state {
        ConversationState::MenuName => "Send the new name.",
        ConversationState::MenuSymbol => "Send the new ticker symbol.",
        ConversationState::MenuFees => "Send fees, e.g. <code>1%</code> or <code>1% 0.5%</code>.",
        ConversationState::MenuContext => "Send the x.com post or Warpcast cast link.",
        ConversationState::MenuImage => {
            "Send an <code>ipfs://</code> link, a CID, or an https image URL. Uploads aren't accepted here."
        }
        ConversationState::MenuSpoof => {
            "Send the 0x address that should receive creator rewards, or <code>none</code> to clear it."
        }
        ConversationState::MenuProfileSave => "Send a name for this preset.",
        ConversationState::MenuProfileLoad => "Which preset should I load?",
        ConversationState::MenuProfileDelete => "Which preset should I delete?",
        _ => "",
    }
}

pub fn preset_list(presets: &[PresetSummary]) -> String {
    if presets.is_empty() {
        return "No presets yet. Save the current draft with /save &lt;name&gt;.".to_string();
    }
    let mut lines = vec!["<b>Presets</b>".to_string(), String::new()];
    for preset in presets {
        let symbol = preset
            .symbol
            .as_deref()
            .map(|s| format!(" <code>${}</code>", escape_html(s)))
            .unwrap_or_default();
        lines.push(format!(
            "• {}{} ({})",
            escape_html(&preset.name),
            symbol,
            preset.updated_at.format("%Y-%m-%d %H:%M")
        ));
    }
    lines.join("\n")
}

pub fn preset_keyboard(presets: &[PresetSummary], prefix: &str) -> Keyboard {
    presets
        .iter()
        .map(|p| vec![Button::new(p.name.clone(), format!("{prefix}{}", p.name))])
        .collect()
}

pub fn preset_saved(name: &str) -> String {
    format!("💾 Saved preset <b>{}</b>.", escape_html(name))
}

pub fn preset_loaded(name: &str) -> String {
    format!("📂 Loaded preset <b>{}</b>.", escape_html(name))
}

pub fn preset_deleted(name: &str) -> String {
    format!("🗑 Deleted preset <b>{}</b>.", escape_html(name))
}

pub fn preset_missing(name: &str) -> String {
    format!("No preset named <b>{}</b>. /presets lists them.", escape_html(name))
}

pub fn links_merged(count: usize) -> String {
    if count == 1 {
        "🔗 Added 1 link.".to_string()
    } else {
        format!("🔗 Added {count} links.")
    }
}

pub fn upload_rejected() -> &'static str {
    "🖼 Images are only taken at the wizard's image step. Send <code>image: ipfs://…</code> or an https URL instead."
}

pub fn upload_unavailable() -> &'static str {
    "🖼 Image uploads aren't enabled on this bot. Send an <code>ipfs://</code> link or an https URL instead."
}

pub fn upload_unreadable() -> &'static str {
    "🖼 Couldn't fetch that file. Try again or send a link instead."
}

pub fn upload_failed(error: &str) -> String {
    format!("🖼 Upload failed: {}", escape_html(error))
}

pub fn deploy_unavailable() -> &'static str {
    "Deployment isn't configured on this bot. Your draft is saved."
}

pub fn deploy_in_flight() -> &'static str {
    "⏳ A deployment is already running for this chat."
}

pub fn deploy_aborted() -> &'static str {
    "Deployment cancelled. Your draft is kept; /deploy when you're ready."
}

pub fn config_rejected(error: &str) -> String {
    format!("⚠️ Can't deploy: {}", escape_html(error))
}

pub fn notes(notes: &[ValidationNote]) -> String {
    notes
        .iter()
        .map(|n| {
            let icon = match n.level {
                NoteLevel::Info => "ℹ️",
                NoteLevel::Warning => "⚠️",
            };
            format!("{icon} {}", escape_html(&n.message))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn deploy_succeeded(config: &DeployConfig, outcome: &DeployOutcome) -> String {
    let mut lines = vec![format!(
        "🎉 <b>{}</b> (<code>${}</code>) deployed!",
        escape_html(&config.name),
        escape_html(&config.symbol)
    )];
    if let Some(address) = &outcome.address {
        lines.push(format!("Address: <code>{}</code>", escape_html(address)));
    }
    if let Some(tx) = &outcome.tx_hash {
        lines.push(format!("Tx: <code>{}</code>", escape_html(tx)));
    }
    if let Some(url) = &outcome.scan_url {
        lines.push(format!(r#"<a href="{}">View on explorer</a>"#, escape_html(url)));
    }
    lines.join("\n")
}

pub fn deploy_failed(outcome: &DeployOutcome) -> String {
    let error = outcome.error.as_deref().unwrap_or("unknown error");
    format!(
        "❌ Deployment failed: {}\nYour draft is kept; /deploy to retry.",
        escape_html(error)
    )
}

pub fn fresh_draft() -> &'static str {
    "🆕 Started a new draft. Send fields or use /wizard."
}

pub fn cancelled() -> &'static str {
    "Cancelled. The draft was cleared."
}

pub fn nothing_to_confirm() -> &'static str {
    "Nothing to confirm right now. /deploy to review the draft."
}

/// Reply for input no rule claimed.
pub fn unrecognised() -> &'static str {
    "🤔 Not sure what to do with that. Reply <b>yes</b> or <b>no</b> when confirming, or see /help."
}

pub fn storage_failed() -> &'static str {
    "⚠️ Couldn't save your draft. Try again in a moment."
}

#[cfg(test)]
mod tests {
    use super::*;
    use clank_proto::Fees;

    #[test]
    fn summary_escapes_user_values() {
        let draft = TokenDraft {
            name: Some("<Cats & Dogs>".to_string()),
            symbol: Some("CND".to_string()),
            fees: Fees::new(100, 50),
            ..TokenDraft::default()
        };
        let text = draft_summary(&draft);
        assert!(text.contains("&lt;Cats &amp; Dogs&gt;"));
        assert!(text.contains("1% / 0.5%"));
        assert!(text.contains("Image: <i>unset</i>"));
    }

    #[test]
    fn field_menu_uses_menu_callbacks() {
        let data: Vec<String> = field_menu()
            .into_iter()
            .flatten()
            .map(|b| b.data)
            .collect();
        assert!(data.contains(&"menu:fees".to_string()));
        assert!(data.contains(&WIZARD_START.to_string()));
        assert!(data.iter().all(|d| d.len() <= 64));
    }

    #[test]
    fn not_ready_lists_missing_and_optional() {
        let status = ReadyStatus {
            ready: false,
            missing: vec!["symbol"],
            optional_unset: vec!["image", "context"],
        };
        assert_eq!(
            not_ready(&status),
            "Still needed: <b>symbol</b>\nOptional: image, context"
        );
    }
}
