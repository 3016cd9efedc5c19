//! `loto` - ingest draw batches, retrain the rolling prediction, inspect state.
//!
//! # Usage
//!
//! ```bash
//! loto ingest draws_2024.csv
//! loto --data-dir /var/lib/loto status
//! loto history --limit 10
//! loto serve --bind 0.0.0.0:8080
//! ```
//!
//! # Exit Codes (ingest)
//!
//! - 0: Merge committed, prediction and history stages succeeded or declined
//! - 1: Merge committed, but the prediction or history stage failed
//! - 2: Batch rejected (bad columns, cells or encoding) or store not
//!   readable/writable; nothing committed
//! - 3: Configuration error, or the batch file could not be read

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use loto_pipeline::api::{self, ApiState};
use loto_pipeline::{BatchFormat, Pipeline, PipelineConfig, PipelineError, RawBatch};

#[derive(Parser, Debug)]
#[command(name = "loto")]
#[command(about = "Lottery draw ingest-merge-retrain pipeline")]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, env = "LOTO_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Directory holding the store and prediction artifacts
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Merge a batch file into the store and retrain
    Ingest {
        file: PathBuf,

        /// Batch encoding (csv, json or xlsx); inferred from the extension if omitted
        #[arg(short, long)]
        format: Option<BatchFormat>,
    },
    /// Print store stats, current prediction and history size
    Status,
    /// Print the prediction history log
    History {
        /// Only the most recent N entries
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Serve the HTTP upload endpoint
    Serve {
        /// Address to bind (overrides config)
        #[arg(short, long)]
        bind: Option<String>,
    },
}

fn main() {
    let _ = dotenv::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            3
        }
    };
    std::process::exit(code);
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "loto_pipeline=info,loto=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let mut config = PipelineConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?;
            config.apply_env_overrides();
            config
        }
        None => PipelineConfig::from_env(),
    };
    if let Some(dir) = &cli.data_dir {
        config.storage.data_dir = dir.clone();
    }
    Ok(config)
}

fn run(cli: Cli) -> Result<i32> {
    let config = load_config(&cli)?;
    let pipeline = Pipeline::from_config(&config).context("Failed to initialize pipeline")?;

    match cli.command {
        Command::Ingest { file, format } => ingest(&pipeline, &file, format),
        Command::Status => {
            let status = pipeline.status().context("Failed to read pipeline state")?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(0)
        }
        Command::History { limit } => {
            let entries = pipeline.history().context("Failed to read history log")?;
            let skip = limit.map_or(0, |n| entries.len().saturating_sub(n));
            println!("{}", serde_json::to_string_pretty(&entries[skip..])?);
            Ok(0)
        }
        Command::Serve { bind } => {
            let addr = bind.unwrap_or_else(|| config.server.bind_addr.clone());
            let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
            runtime.block_on(serve(pipeline, &addr))?;
            Ok(0)
        }
    }
}

fn ingest(pipeline: &Pipeline, file: &Path, format: Option<BatchFormat>) -> Result<i32> {
    let format = format.unwrap_or_else(|| BatchFormat::from_path(file));
    let batch = match RawBatch::from_path(file, format) {
        Ok(batch) => batch,
        Err(e @ PipelineError::Io(_)) => return Err(e.into()),
        Err(e) => {
            error!("Rejected batch {}: {}", file.display(), e);
            return Ok(2);
        }
    };
    info!(file = %file.display(), rows = batch.len(), "Batch loaded");

    match pipeline.run(&batch) {
        Ok(report) => {
            for line in report.messages() {
                println!("{}", line);
            }
            if report.is_partial() {
                warn!("Merge committed with warnings");
                Ok(1)
            } else {
                Ok(0)
            }
        }
        Err(e @ (PipelineError::Config(_) | PipelineError::Io(_))) => Err(e.into()),
        Err(e) => {
            error!("Error processing batch: {}", e);
            Ok(2)
        }
    }
}

async fn serve(pipeline: Pipeline, addr: &str) -> Result<()> {
    let state = Arc::new(ApiState {
        pipeline: Arc::new(pipeline),
    });
    let app = api::router(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
