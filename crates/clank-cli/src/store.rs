//! Offline access to the durable draft store and the instance lock.
//!
//! Provides:
//! - `clank lock status`: Show who holds the lock and whether they're alive
//! - `clank draft show|clear --chat <id>`: Inspect or drop a chat's draft
//! - `clank preset list --chat <id>`: List a chat's presets
//! - `clank deploy --chat <id> [--yes]`: Deploy a stored draft from the terminal

use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clank_core::conversation::render;
use clank_core::{
    CommandDeployer, DraftStore, InstanceLock, NoteLevel, Settings, create_config_from_session,
    get_ready_status, pid_is_alive, strip_html, validate_config,
};
use clank_proto::{DeployOutcome, TokenDeployer};

use crate::bot::acquire_lock;
use crate::display::{print_error, print_heading, print_status, print_success, print_warning};

// ─────────────────────────────────────────────────────────────────────────────
// LOCK
// ─────────────────────────────────────────────────────────────────────────────

pub fn lock_status(lock_path: &Path, use_colors: bool) -> Result<()> {
    let Some(record) = InstanceLock::read_record(lock_path)? else {
        print_status(use_colors, &format!("No lock at {}", lock_path.display()));
        return Ok(());
    };

    print_heading(use_colors, &format!("Lock {}", lock_path.display()));
    print_status(use_colors, &format!("PID: {}", record.pid));
    print_status(use_colors, &format!("Host: {}", record.hostname));
    print_status(use_colors, &format!("Started: {}", record.started_at.to_rfc3339()));
    print_status(use_colors, &format!("Directory: {}", record.cwd.display()));
    if pid_is_alive(record.pid) {
        print_success(use_colors, "Holder is running");
    } else {
        print_warning(use_colors, "Holder is gone; the next `clank run` reclaims this lock");
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// DRAFTS & PRESETS
// ─────────────────────────────────────────────────────────────────────────────

pub fn draft_show(drafts_path: &Path, chat_id: i64, use_colors: bool) -> Result<()> {
    let store = DraftStore::open(drafts_path)?;
    let Some(draft) = store.get_draft(chat_id) else {
        print_status(use_colors, &format!("No draft stored for chat {chat_id}"));
        return Ok(());
    };

    print_heading(use_colors, &format!("Draft for chat {chat_id}"));
    for line in strip_html(&render::draft_summary(&draft)).lines() {
        print_status(use_colors, line);
    }
    if let Some(updated) = store.updated_at(chat_id) {
        print_status(use_colors, &format!("Updated: {}", updated.to_rfc3339()));
    }

    let status = get_ready_status(&draft);
    if status.ready {
        print_success(use_colors, "Ready to deploy");
    } else {
        print_warning(use_colors, &strip_html(&render::not_ready(&status)));
    }
    Ok(())
}

/// Drops a chat's draft. Refuses while a bot holds the lock.
pub fn draft_clear(drafts_path: &Path, lock_path: &Path, chat_id: i64, use_colors: bool) -> Result<()> {
    let lock = acquire_lock(lock_path)?;
    let mut store = DraftStore::open(drafts_path)?;
    if store.clear_draft(chat_id)? {
        print_success(use_colors, &format!("Cleared draft for chat {chat_id}"));
    } else {
        print_status(use_colors, &format!("No draft stored for chat {chat_id}"));
    }
    lock.release()?;
    Ok(())
}

pub fn preset_list(drafts_path: &Path, chat_id: i64, use_colors: bool) -> Result<()> {
    let store = DraftStore::open(drafts_path)?;
    let presets = store.list_presets(chat_id);
    if presets.is_empty() {
        print_status(use_colors, &format!("No presets for chat {chat_id}"));
        return Ok(());
    }

    print_heading(use_colors, &format!("Presets for chat {chat_id}"));
    for preset in presets {
        print_status(
            use_colors,
            &format!(
                "{} ({}) - updated {}",
                preset.name,
                preset.symbol.as_deref().unwrap_or("no symbol"),
                preset.updated_at.format("%Y-%m-%d %H:%M")
            ),
        );
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// DEPLOY
// ─────────────────────────────────────────────────────────────────────────────

/// Readiness, build, validate, confirm, deploy. Clears the draft on success.
pub async fn deploy(
    settings: &Settings,
    lock_path: &Path,
    chat_id: i64,
    assume_yes: bool,
    use_colors: bool,
) -> Result<()> {
    let deployer = CommandDeployer::from_command(
        &settings.deploy.command,
        Duration::from_secs(settings.deploy.command_timeout_secs),
    )
    .context("no deploy command configured (set deploy.command or CLANK_DEPLOY_COMMAND)")?;

    let lock = acquire_lock(lock_path)?;
    let result = deploy_locked(settings, &deployer, chat_id, assume_yes, use_colors).await;
    lock.release()?;
    result
}

async fn deploy_locked(
    settings: &Settings,
    deployer: &dyn TokenDeployer,
    chat_id: i64,
    assume_yes: bool,
    use_colors: bool,
) -> Result<()> {
    let mut store = DraftStore::open(&settings.storage.drafts_path)?;
    let draft = store
        .get_draft(chat_id)
        .with_context(|| format!("no draft stored for chat {chat_id}"))?;

    let status = get_ready_status(&draft);
    if !status.ready {
        anyhow::bail!("draft is not ready: {}", strip_html(&render::not_ready(&status)));
    }

    let config = create_config_from_session(&draft, settings.deploy.deployer_address.as_deref())?;
    let validated = validate_config(config)?;

    print_heading(use_colors, &format!("Deploying draft for chat {chat_id}"));
    for line in strip_html(&render::draft_summary(&draft)).lines() {
        print_status(use_colors, line);
    }
    for note in &validated.notes {
        match note.level {
            NoteLevel::Info => print_status(use_colors, &note.message),
            NoteLevel::Warning => print_warning(use_colors, &note.message),
        }
    }

    if !assume_yes && !confirm("Deploy now? [y/N] ")? {
        print_status(use_colors, "Aborted");
        return Ok(());
    }

    let outcome = deployer.deploy(&validated.config).await;
    report(&outcome, use_colors);
    if !outcome.success {
        anyhow::bail!(
            "deploy failed: {}",
            outcome.error.as_deref().unwrap_or("unknown error")
        );
    }
    store.clear_draft(chat_id)?;
    Ok(())
}

fn report(outcome: &DeployOutcome, use_colors: bool) {
    if !outcome.success {
        print_error(
            use_colors,
            outcome.error.as_deref().unwrap_or("Deployment failed"),
        );
        return;
    }
    print_success(use_colors, "Token deployed");
    for (label, value) in [
        ("Address", &outcome.address),
        ("Transaction", &outcome.tx_hash),
        ("Explorer", &outcome.scan_url),
    ] {
        if let Some(value) = value {
            print_status(use_colors, &format!("{label}: {value}"));
        }
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("  {prompt}");
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin()
        .read_line(&mut input)
        .context("Failed to read input")?;
    Ok(matches!(input.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use clank_proto::{DeployConfig, TokenDraft};
    use std::sync::Mutex;
    use tempfile::TempDir;

    const CHAT: i64 = 7;
    const ADMIN: &str = "0x1111111111111111111111111111111111111111";

    struct RecordingDeployer {
        calls: Mutex<Vec<DeployConfig>>,
        outcome: DeployOutcome,
    }

    #[async_trait]
    impl TokenDeployer for RecordingDeployer {
        async fn deploy(&self, config: &DeployConfig) -> DeployOutcome {
            self.calls.lock().unwrap().push(config.clone());
            self.outcome.clone()
        }
    }

    fn settings(dir: &TempDir) -> Settings {
        let mut settings = Settings::default();
        settings.storage.drafts_path = dir.path().join("drafts.json");
        settings.deploy.deployer_address = Some(ADMIN.to_string());
        settings
    }

    fn store_draft(settings: &Settings, symbol: Option<&str>) {
        let mut store = DraftStore::open(&settings.storage.drafts_path).unwrap();
        let draft = TokenDraft {
            symbol: symbol.map(str::to_string),
            description: Some("a cat".to_string()),
            ..TokenDraft::default()
        };
        store.save_draft(CHAT, &draft).unwrap();
    }

    fn deployer(outcome: DeployOutcome) -> RecordingDeployer {
        RecordingDeployer {
            calls: Mutex::new(Vec::new()),
            outcome,
        }
    }

    #[tokio::test]
    async fn successful_deploy_clears_the_draft() {
        let dir = TempDir::new().unwrap();
        let settings = settings(&dir);
        store_draft(&settings, Some("MCAT"));
        let deployer = deployer(DeployOutcome {
            success: true,
            address: Some("0xtoken".to_string()),
            ..DeployOutcome::default()
        });

        deploy_locked(&settings, &deployer, CHAT, true, false)
            .await
            .unwrap();

        let calls = deployer.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].symbol, "MCAT");
        assert_eq!(calls[0].name, "MCAT");
        let store = DraftStore::open(&settings.storage.drafts_path).unwrap();
        assert!(store.get_draft(CHAT).is_none());
    }

    #[tokio::test]
    async fn failed_deploy_keeps_the_draft() {
        let dir = TempDir::new().unwrap();
        let settings = settings(&dir);
        store_draft(&settings, Some("MCAT"));
        let deployer = deployer(DeployOutcome::failed("out of gas"));

        let err = deploy_locked(&settings, &deployer, CHAT, true, false)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("out of gas"));
        let store = DraftStore::open(&settings.storage.drafts_path).unwrap();
        assert!(store.get_draft(CHAT).is_some());
    }

    #[tokio::test]
    async fn unready_draft_is_never_deployed() {
        let dir = TempDir::new().unwrap();
        let settings = settings(&dir);
        store_draft(&settings, None);
        let deployer = deployer(DeployOutcome::default());

        let err = deploy_locked(&settings, &deployer, CHAT, true, false)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("symbol"));
        assert!(deployer.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_deployer_address_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut settings = settings(&dir);
        settings.deploy.deployer_address = None;
        store_draft(&settings, Some("MCAT"));
        let deployer = deployer(DeployOutcome::default());

        assert!(
            deploy_locked(&settings, &deployer, CHAT, true, false)
                .await
                .is_err()
        );
        assert!(deployer.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn draft_clear_removes_the_draft() {
        let dir = TempDir::new().unwrap();
        let settings = settings(&dir);
        store_draft(&settings, Some("MCAT"));
        let lock_path = dir.path().join("bot.lock");

        draft_clear(&settings.storage.drafts_path, &lock_path, CHAT, false).unwrap();

        let store = DraftStore::open(&settings.storage.drafts_path).unwrap();
        assert!(store.get_draft(CHAT).is_none());
        assert!(!lock_path.exists());
    }

    #[test]
    fn lock_status_without_a_lock_is_fine() {
        let dir = TempDir::new().unwrap();
        lock_status(&dir.path().join("missing.lock"), false).unwrap();
    }
}
