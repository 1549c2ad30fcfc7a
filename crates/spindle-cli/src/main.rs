//! spindle - durable event delivery to a search indexer.
//!
//! Reads sync-client notifications as JSON lines (stdin or a file), keeps
//! indexable events in a SQLite-backed queue and posts them in batches to
//! the indexer.
//!
//! ```bash
//! sync-client | spindle run --sink-url http://localhost:8000/api/
//! spindle run --config spindle.toml --input events.jsonl
//! spindle status --store-dir ./store
//! ```
//!
//! Ctrl-C stops intake and the worker; undelivered events stay in the store
//! and go out on the next run.

mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use spindle_core::impls::{HttpSink, JsonLinesSource, SqliteTaskStore};
use spindle_core::ports::{DeadLetter, TaskStore};
use spindle_core::{Pipeline, PipelineBuilder, SpindleError};
use tokio::io::BufReader;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{SettingsArgs, StoreConfig};

const DRAIN_POLL: Duration = Duration::from_millis(200);

#[derive(Parser, Debug)]
#[command(name = "spindle")]
#[command(about = "Durable event delivery to a search indexer")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the pipeline until the input ends (and the queue drains) or Ctrl-C
    Run {
        #[command(flatten)]
        settings: SettingsArgs,

        /// JSON lines input, `-` for stdin
        #[arg(long, short, default_value = "-", env = "SPINDLE_INPUT")]
        input: String,
    },

    /// Print pending task count and dead letters as JSON
    Status {
        #[command(flatten)]
        settings: SettingsArgs,
    },
}

#[derive(Debug, Serialize)]
struct StatusReport {
    store: String,
    pending: usize,
    dead_letters: Vec<DeadLetter>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout は status の JSON 用に空けておく
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run { settings, input } => run(&settings, &input).await,
        Command::Status { settings } => status(&settings).await,
    }
}

fn open_store(config: &StoreConfig) -> Result<SqliteTaskStore> {
    std::fs::create_dir_all(&config.dir)
        .with_context(|| format!("failed to create store directory {}", config.dir.display()))?;
    let db = config.db_path();
    SqliteTaskStore::open(&db).with_context(|| format!("failed to open {}", db.display()))
}

async fn run(args: &SettingsArgs, input: &str) -> Result<()> {
    let settings = args.resolve()?;
    let store = open_store(&settings.store)?;
    let sink = HttpSink::new(&settings.sink).context("invalid sink configuration")?;
    info!(
        sink = %sink.endpoint(),
        store = %settings.store.db_path().display(),
        batch_size = settings.queue.batch_size,
        max_retries = settings.queue.max_retries,
        "starting spindle"
    );

    let mut pipeline = PipelineBuilder::new()
        .config(settings.queue.clone())
        .store(Arc::new(store))
        .sink(Arc::new(sink))
        .build()
        .context("failed to build pipeline")?;

    if input == "-" {
        pipeline.attach(&JsonLinesSource::stdin())?;
    } else {
        let file = tokio::fs::File::open(input)
            .await
            .with_context(|| format!("failed to open input {input}"))?;
        pipeline.attach(&JsonLinesSource::new(BufReader::new(file)))?;
    }

    tokio::select! {
        result = drain(&mut pipeline) => {
            match result {
                Ok(()) => info!("input ended and queue drained"),
                Err(e) => warn!(error = %e, "could not confirm the queue drained"),
            }
        }
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("shutdown signal received, stopping gracefully"),
                Err(e) => warn!(error = %e, "failed to listen for shutdown signal"),
            }
        }
    }

    let counts = pipeline.counts().await?;
    info!(
        pending = counts.pending,
        delivered_batches = counts.delivered_batches,
        abandoned_batches = counts.abandoned_batches,
        "stopping"
    );
    pipeline.shutdown().await;
    Ok(())
}

async fn drain(pipeline: &mut Pipeline) -> Result<(), SpindleError> {
    pipeline.run_until_sources_end().await;
    pipeline.wait_until_drained(DRAIN_POLL).await
}

async fn status(args: &SettingsArgs) -> Result<()> {
    let settings = args.resolve()?;
    let store = open_store(&settings.store)?;

    let report = StatusReport {
        store: settings.store.db_path().display().to_string(),
        pending: store.count_pending().await?,
        dead_letters: store.dead_letters().await?,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_flags_parse() {
        let cli = Cli::try_parse_from([
            "spindle",
            "run",
            "--store-dir",
            "/tmp/s",
            "--batch-size",
            "10",
            "--dead-letter",
            "--input",
            "events.jsonl",
        ])
        .unwrap();

        match cli.command {
            Command::Run { settings, input } => {
                assert_eq!(input, "events.jsonl");
                assert_eq!(settings.batch_size, Some(10));
                assert!(settings.dead_letter);
                assert_eq!(settings.store_dir.as_deref(), Some(std::path::Path::new("/tmp/s")));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn status_on_fresh_store_reports_nothing_pending() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&StoreConfig {
            dir: dir.path().join("nested"),
        })
        .unwrap();

        assert_eq!(store.count_pending().await.unwrap(), 0);
        assert!(store.dead_letters().await.unwrap().is_empty());
        assert!(dir.path().join("nested").join("queue.sqlite3").exists());
    }
}
