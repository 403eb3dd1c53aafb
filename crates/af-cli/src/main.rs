//! appfreeze CLI
//!
//! Toggles a selected set of applications between normal and suspended
//! state through a privileged broker. Reversing a suspension requires a
//! credential challenge.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use af_core::config;
use appfreeze::commands::{self, start_session};

#[derive(Parser)]
#[command(name = "appfreeze")]
#[command(author, version, about = "Suspend applications behind a credential-gated toggle")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the reconciled toggle state
    Status,

    /// Suspend all selected targets
    On,

    /// Restore all selected targets (credential challenge required)
    Off,

    /// Manage the target selection
    Targets {
        #[command(subcommand)]
        command: TargetsCommand,
    },

    /// Stay resident and print every state change
    Watch,
}

#[derive(Subcommand)]
enum TargetsCommand {
    /// Replace the selection with the given identifiers
    Set {
        /// Target identifiers (e.g. package names)
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Clear the selection
    Clear,

    /// List the persisted selection
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| cli.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(config::default_config_path);
    let config = config::load_or_default(&config_path)?;

    // `targets list` is pure store I/O; everything else runs a controller.
    if let Commands::Targets {
        command: TargetsCommand::List,
    } = &cli.command
    {
        return commands::targets_list(&config);
    }

    let session = start_session(&config);
    let outcome = match cli.command {
        Commands::Status => commands::status_command(&session).await,
        Commands::On => commands::on_command(&session).await,
        Commands::Off => commands::off_command(&session).await,
        Commands::Targets { command } => match command {
            TargetsCommand::Set { ids } => commands::targets_set(&session, ids).await,
            TargetsCommand::Clear => commands::targets_clear(&session).await,
            TargetsCommand::List => unreachable!("handled above"),
        },
        Commands::Watch => commands::watch_command(&session).await,
    };

    session.close().await;
    outcome
}
