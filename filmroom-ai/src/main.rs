//! filmroom-ai - game film annotation pipeline
//!
//! Drives segmentation, per-play deep analysis and verification against the
//! configured provider for one recording, then writes `stage1.json`,
//! `stage2.json`, `stage3.json` and `aggregated.json` into the output folder.

use anyhow::{Context, Result};
use clap::Parser;
use filmroom_ai::checkpoint::FileCheckpointStore;
use filmroom_ai::config::{self, PipelineSettings, OUTPUT_DIR_ENV_VAR};
use filmroom_ai::events::{log_events, EVENT_BUFFER};
use filmroom_ai::provider::gemini::GeminiProvider;
use filmroom_ai::{Pipeline, SourceSpec};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

/// Command-line arguments for filmroom-ai
#[derive(Parser, Debug)]
#[command(name = "filmroom-ai")]
#[command(about = "Annotate a full game recording play by play")]
#[command(version)]
struct Args {
    /// Provider file URI of the recording
    #[arg(short, long, env = "FILMROOM_SOURCE")]
    source: String,

    /// Identifier stored with the Stage 1 checkpoint (defaults to the URI)
    #[arg(long)]
    source_id: Option<String>,

    /// Folder receiving the stage artifacts
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// TOML config file (defaults to the platform config folder)
    #[arg(short, long, env = "FILMROOM_CONFIG")]
    config: Option<PathBuf>,

    /// Reuse Stage 1 and Stage 2 checkpoints found in the output folder
    #[arg(long)]
    resume: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config is read before tracing starts so its log level can apply
    let loaded = config::load_config(args.config.as_deref());
    let level = loaded
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .init();

    info!(
        "Starting filmroom-ai v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let toml_config = loaded.context("Failed to load configuration")?;
    let mut settings = PipelineSettings::from_config(&toml_config);
    settings.resume |= args.resume;

    let output_dir = filmroom_common::config::resolve_output_dir(
        args.output_dir.as_deref(),
        OUTPUT_DIR_ENV_VAR,
        toml_config.output_dir.as_deref(),
    );
    info!("Output folder: {}", output_dir.display());

    let api_key = config::resolve_api_key(&toml_config)?;
    let provider = GeminiProvider::new(&toml_config.provider, api_key)
        .context("Failed to initialize provider")?;
    info!(
        "Provider: {} ({} requests/minute)",
        toml_config.provider.model, toml_config.provider.requests_per_minute
    );

    let (tx, rx) = broadcast::channel(EVENT_BUFFER);
    let logger = tokio::spawn(log_events(rx));

    let pipeline = Pipeline::new(
        Arc::new(provider),
        Arc::new(FileCheckpointStore::new(&output_dir)),
        settings,
    )
    .with_events(tx);

    let source = SourceSpec {
        source_id: args.source_id.unwrap_or_else(|| args.source.clone()),
        uri: args.source,
    };

    let result = pipeline.run(&source).await;
    drop(pipeline);
    let _ = logger.await;

    let report = result.context("Annotation run failed")?;
    let summary = &report.summary;
    info!(
        "Wrote {} records to {} ({} analyzed, {} reused, {} skipped; {} proposals applied, {} below threshold, {} rejected)",
        summary.records,
        output_dir.join("aggregated.json").display(),
        summary.analyzed,
        summary.reused,
        summary.skipped,
        summary.proposals_applied,
        summary.proposals_below_threshold,
        summary.proposals_rejected
    );
    if summary.checkpoint_failures > 0 {
        tracing::warn!(
            "{} checkpoint writes failed during the run",
            summary.checkpoint_failures
        );
    }

    Ok(())
}
