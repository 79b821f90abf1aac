// Campuslog CLI
//
// Design Decision: Batch operations run in-process against the log directory and
// the database, so they can be scheduled (cron) without the API server.
// Design Decision: Use clap derive for ergonomic argument parsing.
// Design Decision: Support text/json output formats for scripting.

mod commands;
mod output;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use campuslog_core::SystemClock;
use campuslog_durable::{
    AdminFacade, InMemoryLogRecordStore, LogDirectory, LogRecordStore, PostgresLogRecordStore,
};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser)]
#[command(name = "campuslog")]
#[command(about = "Campuslog CLI - Import, clean up and recover the event log")]
#[command(version)]
pub struct Cli {
    /// Directory holding app_<YYYY-MM-DD>.log files
    #[arg(long, env = "CAMPUSLOG_DIR", default_value = "logs")]
    pub log_dir: PathBuf,

    /// PostgreSQL URL of the error index
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// Age limit for `cleanup` without --keep-today-only
    #[arg(long, env = "CAMPUSLOG_RETENTION_DAYS", default_value = "30")]
    pub retention_days: u32,

    /// Output format
    #[arg(long, short, default_value = "text", value_parser = ["text", "json"])]
    pub output: String,

    /// Suppress non-essential output
    #[arg(long, short)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List partition files with size, line count and modification time
    Files,

    /// Import lines from the files into the error index
    Import {
        /// Single partition file, e.g. app_2025-01-01.log
        #[arg(long, conflicts_with = "today")]
        file: Option<String>,

        /// Only today's file
        #[arg(long)]
        today: bool,

        /// Maximum rows inserted per file
        #[arg(long)]
        limit_per_file: Option<usize>,

        /// Import every level instead of ERROR only
        #[arg(long)]
        all_levels: bool,
    },

    /// Delete partition files by the retention policy
    Cleanup {
        /// Delete every file except today's
        #[arg(long)]
        keep_today_only: bool,
    },

    /// Wipe the index, keep only today's file, re-import today's errors
    Recover,

    /// Delete rows from the error index
    Purge {
        /// Only ERROR rows already marked read
        #[arg(long)]
        read_only: bool,
    },
}

impl Commands {
    fn needs_database(&self) -> bool {
        matches!(
            self,
            Commands::Import { .. } | Commands::Recover | Commands::Purge { .. }
        )
    }
}

fn init_tracing() {
    // Logs go to stderr so json output stays parseable
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("campuslog=info"));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(filter),
        )
        .init();
}

async fn open_store(cli: &Cli) -> Result<Arc<dyn LogRecordStore>> {
    match cli.database_url.as_deref().filter(|url| !url.trim().is_empty()) {
        Some(url) => {
            let store = PostgresLogRecordStore::connect(url)
                .await
                .context("Failed to connect to database")?;
            store
                .migrate()
                .await
                .context("Failed to run database migrations")?;
            Ok(Arc::new(store))
        }
        None if cli.command.needs_database() => {
            anyhow::bail!("DATABASE_URL (or --database-url) is required for this command")
        }
        None => Ok(Arc::new(InMemoryLogRecordStore::new())),
    }
}

/// Cancel the token on Ctrl-C; imports stop between files
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, stopping after the current file");
            token.cancel();
        }
    });
    cancel
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing();

    let output_format = output::OutputFormat::parse(&cli.output);
    let store = open_store(&cli).await?;
    let admin = AdminFacade::new(
        store,
        LogDirectory::new(&cli.log_dir),
        Arc::new(SystemClock),
        cli.retention_days,
        cancel_on_ctrl_c(),
    );

    match cli.command {
        Commands::Files => commands::files::run(&admin, output_format).await,
        Commands::Import {
            file,
            today,
            limit_per_file,
            all_levels,
        } => {
            let args = commands::import::ImportArgs {
                file,
                today,
                limit_per_file,
                all_levels,
            };
            commands::import::run(&admin, output_format, cli.quiet, &args).await
        }
        Commands::Cleanup { keep_today_only } => {
            commands::maintenance::cleanup(&admin, output_format, keep_today_only).await
        }
        Commands::Recover => commands::maintenance::recover(&admin, output_format).await,
        Commands::Purge { read_only } => {
            commands::maintenance::purge(&admin, output_format, read_only).await
        }
    }
}
