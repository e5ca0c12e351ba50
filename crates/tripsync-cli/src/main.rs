mod input;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tripsync_core::SyncResult;
use tripsync_extractors::{Extractor, ExtractorRegistry};
use tripsync_storage::{ApiClient, HttpClientConfig};
use tripsync_sync::{PgBookingSink, SyncConfig};

#[derive(Debug, Parser)]
#[command(name = "tripsync")]
#[command(about = "Extract travel bookings from provider emails")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Parse a local email (JSON or header block + body) and print the booking.
    Parse {
        path: PathBuf,
        /// Skip the AI fallback even when OPENAI_API_KEY is set.
        #[arg(long)]
        no_fallback: bool,
    },
    /// Sync bookings from the mailbox (incremental unless --full).
    Sync {
        #[arg(long)]
        full: bool,
    },
    Migrate,
    /// Run incremental syncs on TRIPSYNC_SYNC_CRON until Ctrl-C.
    Schedule,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Sync { full: false }) {
        Commands::Parse { path, no_fallback } => parse_file(&path, no_fallback).await?,
        Commands::Sync { full } => {
            let result = tripsync_sync::run_sync_once_from_env(full).await?;
            report(&result)?;
        }
        Commands::Migrate => {
            let config = SyncConfig::from_env();
            let sink = PgBookingSink::connect(&config.database_url)
                .await
                .context("connecting to database")?;
            sink.migrate().await.context("running migrations")?;
            println!("migrations applied");
        }
        Commands::Schedule => schedule().await?,
    }

    Ok(())
}

async fn parse_file(path: &Path, no_fallback: bool) -> Result<()> {
    let email = input::load_email(path)?;
    let registry = ExtractorRegistry::with_defaults()?;
    let config = SyncConfig::from_env();

    let fallback = if no_fallback {
        None
    } else {
        let api = ApiClient::new(HttpClientConfig {
            timeout: config.call_timeout,
            ..Default::default()
        })?;
        tripsync_sync::ai_fallback(&config, api)
    };

    let record = registry
        .parse_one(&email, fallback.as_ref().map(|f| f as &dyn Extractor))
        .await
        .with_context(|| format!("no booking found in {}", path.display()))?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

async fn schedule() -> Result<()> {
    let mut config = SyncConfig::from_env();
    config.scheduler_enabled = true;
    let sink = PgBookingSink::connect(&config.database_url)
        .await
        .context("connecting to database")?;
    let engine = Arc::new(tripsync_sync::build_engine(&config, Arc::new(sink))?);
    let cancel = engine.cancellation_token();

    let Some(mut sched) = tripsync_sync::maybe_build_scheduler(&config, engine).await? else {
        return Ok(());
    };
    sched.start().await.context("starting scheduler")?;
    tracing::info!(cron = %config.sync_cron, "scheduler running; Ctrl-C to stop");

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    cancel.cancel();
    sched.shutdown().await.context("stopping scheduler")?;
    Ok(())
}

fn report(result: &SyncResult) -> Result<()> {
    println!(
        "sync {}: run_id={} fetched={} parsed={} found={} duplicates={} errors={} duration_ms={}",
        if result.success { "complete" } else { "failed" },
        result.run_id,
        result.emails_fetched,
        result.emails_parsed,
        result.bookings_found,
        result.duplicates_skipped,
        result.errors.len(),
        result.duration_ms,
    );
    for err in &result.errors {
        eprintln!("  {err}");
    }
    anyhow::ensure!(result.success, "sync run {} did not complete", result.run_id);
    Ok(())
}
