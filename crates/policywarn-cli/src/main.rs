//! `policywarn` – command line front end for the policy-warning controller.
//!
//! ```text
//! policywarn replay <script.jsonl> [--quiet]   run a JSON-lines event script
//! policywarn notified <user>                   list resolved services for a user
//! policywarn config                            show (and create) the config file
//! ```
//!
//! Configuration lives in `~/.policywarn/config.toml`; see [`config`].

mod config;
mod host;
mod replay;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::{Parser, Subcommand};
use colored::Colorize;
use policywarn_kernel::codec;
use policywarn_runtime::telemetry;
use policywarn_store::SqliteSettingsStore;
use policywarn_types::UserId;
use tracing::warn;

#[derive(Parser, Debug)]
#[command(name = "policywarn", about = "Per-user policy warning controller")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a JSON-lines event script against a fresh controller
    Replay {
        /// Path to the script
        script: PathBuf,
        /// Suppress per-event console output
        #[arg(long, env = "POLICYWARN_QUIET")]
        quiet: bool,
    },
    /// List the services a user has resolved
    Notified {
        /// Numeric user id
        #[arg(allow_negative_numbers = true)]
        user: i32,
    },
    /// Show (and create) the config file
    Config,
}

fn main() -> ExitCode {
    // Tracing first: the OTLP exporter must exist before any runtime does.
    let _guard = telemetry::init_tracing("policywarn");

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Replay { script, quiet } => cmd_replay(&script, quiet),
        Command::Notified { user } => cmd_notified(UserId(user)),
        Command::Config => cmd_config(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_replay(path: &Path, quiet: bool) -> Result<(), String> {
    let cfg = config::load_or_default()?;
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
    let events = replay::parse_script(&text)?;
    let settings = Arc::new(open_store(&cfg)?);

    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping replay …".yellow().bold());
        stop_flag.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; replay cannot be interrupted cleanly");
    }

    let rt = tokio::runtime::Runtime::new().map_err(|e| format!("Failed to start runtime: {e}"))?;
    let outcome = rt
        .block_on(replay::replay(events, cfg.warnings.clone(), settings, &stop, quiet))
        .map_err(|e| e.to_string())?;

    println!();
    println!(
        "  {} {} event(s) applied{}",
        "✓".green().bold(),
        outcome.applied,
        if outcome.interrupted { " (interrupted)" } else { "" }
    );
    if outcome.visible.is_empty() {
        println!("  No warnings on screen.");
    } else {
        println!("  Warnings on screen:");
        for n in &outcome.visible {
            println!("    • [user {}] {}", n.user_id, n.service.to_short_string().bold());
        }
    }
    Ok(())
}

fn cmd_notified(user: UserId) -> Result<(), String> {
    let cfg = config::load_or_default()?;
    let store = open_store(&cfg)?;
    let raw = store
        .get(user)
        .map_err(|e| e.to_string())?
        .unwrap_or_default();
    let services = codec::decode(&raw);

    if services.is_empty() {
        println!("  User {} has not resolved any warnings.", user);
    } else {
        println!("  User {} resolved:", user);
        for s in &services {
            println!("    • {}", s.to_short_string());
        }
    }
    Ok(())
}

fn cmd_config() -> Result<(), String> {
    let path = config::config_path();
    if !path.exists() {
        config::save(&config::Config::default())?;
        println!("  {} Default config written to {}", "✓".green().bold(), path.display());
    }
    let cfg = config::load_or_default()?;
    println!("  Config: {}", path.display().to_string().bold());
    println!("    db_path            = {}", cfg.db_path.display());
    println!("    grace_period_secs  = {}", cfg.warnings.grace_period_secs);
    println!("    notification_code  = {}", cfg.warnings.notification_code);
    println!("    settings_key       = {}", cfg.warnings.settings_key);
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn open_store(cfg: &config::Config) -> Result<SqliteSettingsStore, String> {
    if let Some(parent) = cfg.db_path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        config::ensure_private_dir(parent)?;
    }
    SqliteSettingsStore::open(&cfg.db_path, &cfg.warnings.settings_key)
        .map_err(|e| format!("Failed to open {}: {}", cfg.db_path.display(), e))
}
