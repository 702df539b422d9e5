//! progressiond - persistent level/XP tracking for game sessions.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use progression_common::{ProgressionManager, SessionId};
use progressiond::autosave::spawn_autosave;
use progressiond::{commands, run_feed, Config, FeedDispatcher, LogSink};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "progressiond")]
#[command(about = "Progression keeper - persistent levels and XP per session", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (default: /etc/progressiond/config.toml, then ./progressiond.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override [store] data_file
    #[arg(long, global = true)]
    data_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Read session events from stdin (default)
    Run,

    /// List every stored session
    List,

    /// Show one session's stored progress
    Show { session: String },

    /// Grant XP to a session
    Grant {
        session: String,

        #[arg(allow_negative_numbers = true)]
        amount: i64,
    },

    /// Reset a session to level 1
    Reset { session: String },

    /// Jump a session to a level with zero progress
    SetLevel { session: String, level: u32 },

    /// Re-normalize every stored record under the current leveling config
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, origin) = Config::resolve(cli.config.as_deref())?;
    if let Some(path) = cli.data_file {
        config.store.data_file = path;
    }

    // stdout carries command output
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.daemon.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();
    origin.log();

    let policy = config.policy()?;
    let manager = Arc::new(ProgressionManager::with_json_file(
        config.store.data_file.clone(),
        policy,
    ));
    info!(
        "progressiond v{} using {} (base {} XP)",
        env!("CARGO_PKG_VERSION"),
        manager.store_location(),
        manager.policy().base_points()
    );

    let command = cli.command.unwrap_or(Commands::Run);
    if !matches!(command, Commands::Run) {
        // Admin commands refuse to overwrite a store they could not read
        manager
            .load()
            .with_context(|| format!("Failed to load {}", manager.store_location()))?;
    }

    let output = match command {
        Commands::Run => {
            if let Err(e) = manager.load() {
                warn!("Starting with an empty store: {}", e);
            }
            return run_daemon(&config, manager).await;
        }
        Commands::List => commands::list(&manager),
        Commands::Show { session } => commands::show(&manager, &SessionId::from(session)),
        Commands::Grant { session, amount } => {
            commands::grant(&manager, &SessionId::from(session), amount)?
        }
        Commands::Reset { session } => commands::reset(&manager, &SessionId::from(session))?,
        Commands::SetLevel { session, level } => {
            commands::set_level(&manager, &SessionId::from(session), level)?
        }
        Commands::Migrate => commands::migrate(&manager)?,
    };
    println!("{}", output);
    Ok(())
}

async fn run_daemon(config: &Config, manager: Arc<ProgressionManager>) -> Result<()> {
    let dispatcher = Arc::new(FeedDispatcher::new(
        Arc::clone(&manager),
        Arc::new(LogSink),
        config.mining_rule()?,
        config.daemon.save_on_detach,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let autosave = config
        .autosave_interval()
        .map(|period| spawn_autosave(Arc::clone(&manager), period, shutdown_rx));

    info!("[READY] Reading session events from stdin");
    let feed = run_feed(BufReader::new(tokio::io::stdin()), dispatcher);
    tokio::select! {
        stats = feed => info!(
            "Feed closed: {} dispatched, {} malformed, {} failed",
            stats.dispatched, stats.malformed, stats.failed
        ),
        _ = tokio::signal::ctrl_c() => info!("Interrupted, shutting down"),
    }

    let _ = shutdown_tx.send(true);
    if let Some(handle) = autosave {
        if let Err(e) = handle.await {
            warn!("Autosave task ended abnormally: {}", e);
        }
    }

    let count = tokio::task::spawn_blocking(move || manager.save_all())
        .await
        .context("Final save task failed")?
        .context("Final save failed")?;
    info!("Saved {} sessions on shutdown", count);
    Ok(())
}
