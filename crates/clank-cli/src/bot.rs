//! Bot commands.
//!
//! Provides:
//! - `clank run`: Acquire the instance lock and serve chats until stopped
//! - `clank probe`: Health-check every configured API origin
//! - `clank token set <token>`: Store the bot token in the OS keychain

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clank_core::{
    CommandDeployer, Conversation, DraftStore, InstanceLock, LockError, RegexLinkExtractor,
    SessionStore, Settings,
};
use clank_telegram::{
    DeployBot, FatalError, MessageDelivery, PollConfig, TelegramError, TransportClient,
    TransportConfig, UpdatePoller,
};
use tracing::{info, warn};

use crate::display::{print_error, print_status, print_success, print_warning};

/// Keychain coordinates for the stored bot token.
const KEYCHAIN_SERVICE: &str = "clank";
const KEYCHAIN_USER: &str = "telegram-bot-token";

// ─────────────────────────────────────────────────────────────────────────────
// RUN
// ─────────────────────────────────────────────────────────────────────────────

/// Serves chats until SIGINT/SIGTERM or a fatal condition.
///
/// The instance lock is released on every return path.
pub async fn run_bot(settings: &Settings, token: String) -> Result<()> {
    let lock_path = settings.lock_path(&token);
    let lock = acquire_lock(&lock_path)?;
    info!(path = %lock_path.display(), pid = lock.record().pid, "Acquired instance lock");

    let result = serve(settings, token).await;

    if let Err(e) = lock.release() {
        warn!(error = %e, "Failed to release instance lock");
    }
    result
}

/// Takes the instance lock, mapping a live holder to a fatal error.
pub fn acquire_lock(path: &std::path::Path) -> Result<InstanceLock> {
    match InstanceLock::acquire(path) {
        Ok(lock) => Ok(lock),
        Err(e @ LockError::AlreadyRunning(_)) => Err(FatalError::new(e.to_string()).into()),
        Err(e) => Err(e).context("failed to acquire instance lock"),
    }
}

async fn serve(settings: &Settings, token: String) -> Result<()> {
    let transport = Arc::new(TransportClient::new(
        token,
        TransportConfig::from_settings(settings),
    )?);

    let me = match transport.get_me().await {
        Ok(me) => me,
        Err(e @ TelegramError::Unauthorized { .. }) => {
            return Err(FatalError::new(e.to_string()).into());
        }
        Err(e) => return Err(anyhow::Error::new(e).context("startup getMe failed")),
    };
    info!(
        bot = me.username.as_deref().unwrap_or(&me.first_name),
        id = me.id,
        origin = transport.active_origin(),
        "Bot online"
    );

    let delivery = Arc::new(
        MessageDelivery::new(transport.clone(), settings.file_origin())
            .with_max_chars(settings.telegram.message_max_chars),
    );

    let mut bot = DeployBot::new(build_conversation(settings, delivery.clone())?, delivery);
    let mut poller = UpdatePoller::new(transport, PollConfig::from_settings(settings));

    let shutdown = Arc::new(AtomicBool::new(false));
    install_signal_handlers(&shutdown);

    // A long poll can take the full poll timeout; a signal abandons it.
    let outcome = tokio::select! {
        result = poller.run(&mut bot, &shutdown) => result,
        () = shutdown_requested(&shutdown) => Ok(()),
    };
    info!("Bot stopped");
    outcome.map_err(Into::into)
}

fn build_conversation(settings: &Settings, delivery: Arc<MessageDelivery>) -> Result<Conversation> {
    let drafts = DraftStore::open(&settings.storage.drafts_path)?;
    let sessions = SessionStore::new(
        drafts,
        Duration::from_secs(settings.session.idle_ttl_secs),
    );

    let mut conversation = Conversation::new(sessions, Box::new(RegexLinkExtractor::new()))
        .with_file_resolver(delivery);

    match CommandDeployer::from_command(
        &settings.deploy.command,
        Duration::from_secs(settings.deploy.command_timeout_secs),
    ) {
        Some(deployer) => conversation = conversation.with_deployer(Arc::new(deployer)),
        None => warn!("No deploy command configured; confirmed deploys will be refused"),
    }
    match &settings.deploy.deployer_address {
        Some(address) => conversation = conversation.with_deployer_address(address.clone()),
        None => warn!("DEPLOYER_ADDRESS is not set; deploys will be rejected"),
    }
    Ok(conversation)
}

fn install_signal_handlers(shutdown: &Arc<AtomicBool>) {
    {
        let flag = shutdown.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            flag.store(true, Ordering::Relaxed);
        });
    }
    #[cfg(unix)]
    {
        let flag = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                    flag.store(true, Ordering::Relaxed);
                }
                Err(e) => warn!(error = %e, "Failed to register SIGTERM handler"),
            }
        });
    }
}

async fn shutdown_requested(shutdown: &AtomicBool) {
    while !shutdown.load(Ordering::Relaxed) {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    info!("Shutdown requested");
}

// ─────────────────────────────────────────────────────────────────────────────
// PROBE
// ─────────────────────────────────────────────────────────────────────────────

/// `getMe` against each origin, once, with the probe timeout.
pub async fn probe(settings: &Settings, token: String, use_colors: bool) -> Result<()> {
    let transport = TransportClient::new(token, TransportConfig::from_settings(settings))?;
    println!();
    print_status(
        use_colors,
        &format!("Probing {} origin(s) as {}", transport.origins().len(), transport.bot_token_masked()),
    );

    let mut healthy = 0;
    for origin in transport.origins() {
        let started = Instant::now();
        let result = transport
            .call_at_origin(origin, "getMe", &serde_json::json!({}))
            .await;
        let elapsed = started.elapsed().as_millis();

        if result.ok {
            healthy += 1;
            print_success(use_colors, &format!("{origin} ({elapsed} ms)"));
        } else if result.error_code == Some(401) {
            print_error(use_colors, &format!("{origin}: token rejected"));
            return Err(FatalError::new("bot token rejected by the API").into());
        } else {
            print_error(use_colors, &format!("{origin}: {}", result.summary()));
        }
    }

    if healthy == 0 {
        anyhow::bail!("no API origin is reachable");
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// TOKEN
// ─────────────────────────────────────────────────────────────────────────────

pub fn token_set(token: &str, use_colors: bool) -> Result<()> {
    let Some(token) = normalize_token(Some(token.to_string())) else {
        anyhow::bail!("token cannot be empty");
    };
    if clank_core::bot_id(&token).is_none() {
        print_warning(
            use_colors,
            "Token doesn't look like <bot id>:<secret>; storing it anyway",
        );
    }
    store_bot_token(&token)?;
    print_success(
        use_colors,
        &format!("Token stored in OS keychain ({KEYCHAIN_SERVICE}/{KEYCHAIN_USER})"),
    );
    Ok(())
}

/// Store bot token in OS keychain.
fn store_bot_token(token: &str) -> Result<()> {
    let entry = keyring::Entry::new(KEYCHAIN_SERVICE, KEYCHAIN_USER)
        .context("Failed to create keychain entry")?;
    if let Err(err) = entry.set_password(token) {
        // Some keychains refuse overwrites; try delete + set as a fallback.
        if entry.delete_credential().is_ok() {
            entry
                .set_password(token)
                .context("Failed to store token in keychain after deleting existing entry")?;
        } else {
            return Err(anyhow::anyhow!(
                "Failed to store token in keychain: {}",
                err
            ));
        }
    }
    Ok(())
}

/// Load bot token from OS keychain.
fn load_bot_token() -> Option<String> {
    keyring::Entry::new(KEYCHAIN_SERVICE, KEYCHAIN_USER)
        .ok()
        .and_then(|e| e.get_password().ok())
}

fn normalize_token(value: Option<String>) -> Option<String> {
    value.and_then(|raw| {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// First non-blank token: flag, then settings (environment over config file),
/// then keychain. The keychain is only consulted when needed.
fn resolve_token_from(
    flag_token: Option<String>,
    settings_token: Option<String>,
    keychain: impl FnOnce() -> Option<String>,
) -> Option<String> {
    normalize_token(flag_token)
        .or_else(|| normalize_token(settings_token))
        .or_else(|| normalize_token(keychain()))
}

/// Resolve the bot token from every source.
pub fn resolve_token(flag_token: Option<String>, settings: &Settings) -> Option<String> {
    resolve_token_from(flag_token, settings.telegram.bot_token.clone(), load_bot_token)
}

/// Like [`resolve_token`], failing when there is none.
pub fn require_token(flag_token: Option<String>, settings: &Settings) -> Result<String> {
    resolve_token(flag_token, settings).ok_or_else(|| TelegramError::MissingBotToken.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clank_core::LockRecord;
    use tempfile::TempDir;

    #[test]
    fn normalize_token_trims_and_drops_blanks() {
        assert_eq!(normalize_token(Some("  123:abc \n".to_string())), Some("123:abc".to_string()));
        assert_eq!(normalize_token(Some("   ".to_string())), None);
        assert_eq!(normalize_token(None), None);
    }

    #[test]
    fn flag_beats_settings_and_keychain() {
        let token = resolve_token_from(
            Some("1:flag".to_string()),
            Some("2:settings".to_string()),
            || panic!("keychain should not be consulted"),
        );
        assert_eq!(token.as_deref(), Some("1:flag"));
    }

    #[test]
    fn blank_sources_fall_through_to_keychain() {
        let token = resolve_token_from(
            Some(" ".to_string()),
            None,
            || Some("3:keychain".to_string()),
        );
        assert_eq!(token.as_deref(), Some("3:keychain"));
    }

    #[test]
    fn settings_token_is_used_without_flag() {
        let token = resolve_token_from(None, Some("2:settings".to_string()), || None);
        assert_eq!(token.as_deref(), Some("2:settings"));
    }

    #[cfg(unix)]
    #[test]
    fn live_lock_holder_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bot.lock");
        let mut holder = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        let record = LockRecord {
            pid: holder.id(),
            started_at: chrono::Utc::now(),
            hostname: "test".to_string(),
            cwd: dir.path().to_path_buf(),
        };
        std::fs::write(&path, serde_json::to_string(&record).unwrap()).unwrap();

        let result = acquire_lock(&path);
        holder.kill().unwrap();
        holder.wait().unwrap();

        let err = result.unwrap_err();
        assert!(err.downcast_ref::<FatalError>().is_some());
    }

    #[test]
    fn free_lock_is_acquired() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bot.lock");
        let lock = acquire_lock(&path).unwrap();
        assert!(path.exists());
        lock.release().unwrap();
        assert!(!path.exists());
    }
}
