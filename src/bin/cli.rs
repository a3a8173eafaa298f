//! pushwatch CLI
//!
//! One invocation is one run; schedule it with cron or a CI timer.

use std::path::PathBuf;

use chrono::Utc;
use clap::{Parser, Subcommand};
use pushwatch::{
    config::load_config,
    error::Result,
    pipeline::{self, RunOutcome},
    storage::{JsonStateStore, StateStore},
};

/// pushwatch - update notifier for a single source
#[derive(Parser, Debug)]
#[command(name = "pushwatch", version, about = "Fetch a source and push what is new")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "data/config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch, compare and notify once (default)
    Run {
        /// Print the message instead of sending it; state is not written
        #[arg(long)]
        dry_run: bool,
    },

    /// Validate the configuration
    Validate,

    /// Show the persisted state
    State,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configuration {}: {}", cli.config.display(), e);
            return Err(e);
        }
    };
    log::debug!("Loaded configuration from {}", cli.config.display());

    match cli.command.unwrap_or(Command::Run { dry_run: false }) {
        Command::Run { dry_run } => match pipeline::run_once(&config, Utc::now(), dry_run).await {
            Ok(RunOutcome::Skipped(reason)) => log::info!("Skipped: {:?}", reason),
            Ok(RunOutcome::Notified { records, reset }) => {
                log::info!("Notified {} record(s){}", records, if reset { " (new window)" } else { "" });
            }
            Ok(RunOutcome::DryRun(Some(message))) => {
                if let Some(summary) = &message.summary {
                    println!("{summary}\n");
                }
                println!("{}", message.content);
                log::info!("Dry run: {} record(s), key {}", message.record_count, message.idempotence_key);
            }
            Ok(RunOutcome::DryRun(None)) => log::info!("Dry run: nothing to send"),
            Err(e) => {
                log::error!("Run failed: {}", e);
                return Err(e);
            }
        },

        Command::Validate => {
            if let Err(e) = config.validate_delivery() {
                log::warn!("Delivery settings incomplete: {}", e);
            }
            log::info!("✓ Config OK ({})", config.source.name);
        }

        Command::State => {
            let store = JsonStateStore::new(&config.state.path);
            match store.load().await? {
                Some(state) => {
                    println!("path:    {}", store.location());
                    println!("window:  {}", state.period_marker);
                    println!("created: {}", state.created_at.to_rfc3339());
                    println!("keys:    {}", state.len());
                    let mut records = state.records.clone();
                    records.sort_by(|a, b| b.observed_at.cmp(&a.observed_at));
                    for record in records.iter().take(20) {
                        println!("  {}  {}", record.observed_at.format("%Y-%m-%d %H:%M"), record.identity_key);
                    }
                }
                None => println!("No state at {}", store.location()),
            }
        }
    }

    Ok(())
}
