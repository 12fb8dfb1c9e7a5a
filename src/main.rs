//! # `ragl`
//!
//! Incremental document ingestion for RAG collections, with an auditable
//! SQLite ledger of every decision.
//!
//! ```bash
//! ragl --config ./config/ragl.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragl init` | Create the ledger schema and the vector store |
//! | `ragl plan` | Show pending intents without executing them |
//! | `ragl sync` | Run one reconciliation pass |
//! | `ragl status` | Current action of every tracked file |
//! | `ragl history <path>` | Every action recorded for one file |
//! | `ragl bots` | Configured bots and their file sets |
//!
//! `ragl sync` exits successfully when individual files fail to load or
//! store; those are retried on the next pass. Ledger integrity errors make
//! it exit non-zero. Scheduling is left to cron or a systemd timer.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rag_ledger::{config, ingest, migrate, status, vector};

#[derive(Parser)]
#[command(
    name = "ragl",
    about = "Incremental RAG ingestion with an auditable ledger",
    version
)]
struct Cli {
    /// Path to the configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ragl.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the ledger schema and open the vector store. Idempotent.
    Init,

    /// Print pending intents as `<action> <collection> <path>`.
    Plan,

    /// Reconcile configured files against the ledger and execute.
    Sync,

    /// Show the current action of every tracked file.
    Status,

    /// Show every action recorded for one file.
    History {
        /// File path; relative paths are taken from the working directory.
        path: PathBuf,
    },

    /// List configured bots and their file sets.
    Bots,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            vector::open_vector_store(&cfg).await?;
            println!("initialized");
        }
        Commands::Plan => ingest::run_plan(&cfg).await?,
        Commands::Sync => ingest::run_sync(&cfg).await?,
        Commands::Status => status::run_status(&cfg).await?,
        Commands::History { path } => status::run_history(&cfg, &path).await?,
        Commands::Bots => status::list_bots(&cfg)?,
    }

    Ok(())
}
