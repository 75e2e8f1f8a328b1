//! # clank
//!
//! Command-line entry point for the Clank deploy bot.
//!
//! `clank run` serves Telegram chats; the other subcommands inspect and act on
//! the same draft store and instance lock from a terminal.

mod bot;
mod display;
mod store;

use std::io::{IsTerminal, stdout};
use std::path::PathBuf;

use anyhow::Result;
use clank_core::Settings;
use clank_telegram::FatalError;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

/// Color output mode for terminal display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorMode {
    /// Automatically detect if stdout is a TTY
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl ColorMode {
    /// Returns true if colors should be used based on mode and terminal detection.
    fn should_use_colors(self) -> bool {
        match self {
            ColorMode::Always => true,
            ColorMode::Never => false,
            ColorMode::Auto => stdout().is_terminal(),
        }
    }
}

/// Clank - deploy tokens from a Telegram chat
#[derive(Parser, Debug)]
#[command(name = "clank", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    // ─────────────────────────────────────────────────────────────────────────
    // Global options (available for all subcommands)
    // ─────────────────────────────────────────────────────────────────────────
    /// Path to a YAML configuration file
    #[arg(short, long, global = true, env = "CLANK_CONFIG")]
    config: Option<PathBuf>,

    /// Bot token (overrides TELEGRAM_BOT_TOKEN, the config file, and the keychain)
    #[arg(long, global = true)]
    token: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Color output mode (auto, always, never)
    #[arg(long, value_enum, default_value_t = ColorMode::Auto, global = true)]
    color: ColorMode,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve chats until SIGINT/SIGTERM
    Run,

    /// Health-check every configured API origin
    Probe,

    /// Inspect the single-instance lock
    Lock {
        #[command(subcommand)]
        command: LockCommands,
    },

    /// Inspect or drop a chat's stored draft
    Draft {
        #[command(subcommand)]
        command: DraftCommands,
    },

    /// Inspect a chat's saved presets
    Preset {
        #[command(subcommand)]
        command: PresetCommands,
    },

    /// Deploy a chat's stored draft with the configured deploy command
    Deploy {
        /// Chat whose draft to deploy
        #[arg(long, allow_negative_numbers = true)]
        chat: i64,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Manage the stored bot token
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },
}

#[derive(Subcommand, Debug)]
enum LockCommands {
    /// Show the lock holder and whether it is still alive
    Status,
}

#[derive(Subcommand, Debug)]
enum DraftCommands {
    /// Print a chat's draft and its readiness
    Show {
        #[arg(long, allow_negative_numbers = true)]
        chat: i64,
    },
    /// Delete a chat's draft (presets are kept)
    Clear {
        #[arg(long, allow_negative_numbers = true)]
        chat: i64,
    },
}

#[derive(Subcommand, Debug)]
enum PresetCommands {
    /// List a chat's presets, newest first
    List {
        #[arg(long, allow_negative_numbers = true)]
        chat: i64,
    },
}

#[derive(Subcommand, Debug)]
enum TokenCommands {
    /// Store a bot token in the OS keychain
    Set {
        /// The token from @BotFather
        token: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    let use_colors = cli.color.should_use_colors();
    if let Err(err) = dispatch(cli, use_colors).await {
        display::print_error(use_colors, &format!("{err:#}"));
        let code = err
            .downcast_ref::<FatalError>()
            .map_or(1, FatalError::exit_code);
        std::process::exit(code);
    }
}

async fn dispatch(cli: Cli, use_colors: bool) -> Result<()> {
    let settings = Settings::load(cli.config.as_deref())
        .map_err(|e| FatalError::new(format!("invalid configuration: {e}")))?;

    match cli.command {
        Commands::Run => {
            let token = bot::require_token(cli.token, &settings)
                .map_err(|e| FatalError::new(e.to_string()))?;
            bot::run_bot(&settings, token).await
        }
        Commands::Probe => {
            let token = bot::require_token(cli.token, &settings)?;
            bot::probe(&settings, token, use_colors).await
        }
        Commands::Lock {
            command: LockCommands::Status,
        } => store::lock_status(&lock_path(cli.token, &settings), use_colors),
        Commands::Draft { command } => match command {
            DraftCommands::Show { chat } => {
                store::draft_show(&settings.storage.drafts_path, chat, use_colors)
            }
            DraftCommands::Clear { chat } => store::draft_clear(
                &settings.storage.drafts_path,
                &lock_path(cli.token, &settings),
                chat,
                use_colors,
            ),
        },
        Commands::Preset {
            command: PresetCommands::List { chat },
        } => store::preset_list(&settings.storage.drafts_path, chat, use_colors),
        Commands::Deploy { chat, yes } => {
            let lock = lock_path(cli.token, &settings);
            store::deploy(&settings, &lock, chat, yes, use_colors).await
        }
        Commands::Token {
            command: TokenCommands::Set { token },
        } => bot::token_set(&token, use_colors),
    }
}

/// The lock a running bot for the resolved token would hold.
fn lock_path(flag_token: Option<String>, settings: &Settings) -> PathBuf {
    let token = bot::resolve_token(flag_token, settings).unwrap_or_default();
    settings.lock_path(&token)
}
