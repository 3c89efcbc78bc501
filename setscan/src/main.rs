//! setscan - DJ set track identification
//!
//! Splits a long recording into overlapping windows, recognizes each window
//! through the configured oracle endpoint and writes a ranked track list to a
//! per-run folder. Chunk results are cached, so reruns only pay for new windows.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use setscan::audio::AudioSlicer;
use setscan::input;
use setscan::oracle::HttpOracle;
use setscan::{run_identification, ChunkCache, RecognitionGateway, ReportWriter, RunRequest, RunSettings};
use setscan_common::config::{load_resolved_config, write_toml_config};
use setscan_common::{Error, TomlConfig};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Extra time the gateway allows on top of the HTTP timeout (WAV encoding)
const ORACLE_CALL_GRACE: Duration = Duration::from_secs(10);

/// Command-line arguments for setscan
#[derive(Parser, Debug)]
#[command(name = "setscan")]
#[command(about = "Identify the tracks played in a DJ set recording")]
#[command(version)]
struct Cli {
    /// Configuration file (overrides SETSCAN_CONFIG and default locations)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    run: RunArgs,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Identify tracks and write a run folder (default)
    Run,
    /// Write the default configuration to a file
    InitConfig {
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Per-run overrides of configuration values
#[derive(Args, Debug)]
struct RunArgs {
    /// Local audio file to analyze
    #[arg(long, global = true, env = "SETSCAN_AUDIO")]
    audio: Option<PathBuf>,

    /// Source identifier (also the YouTube video id for downloads)
    #[arg(long, global = true, env = "SETSCAN_SOURCE_ID")]
    source_id: Option<String>,

    #[arg(long, global = true)]
    chunk_seconds: Option<u32>,

    #[arg(long, global = true)]
    overlap_seconds: Option<u32>,

    #[arg(long, global = true)]
    sample_rate: Option<u32>,

    /// Maximum oracle calls in flight
    #[arg(long, global = true)]
    max_parallel_chunks: Option<usize>,

    /// Recognition endpoint URL
    #[arg(long, global = true, env = "SETSCAN_ORACLE_ENDPOINT")]
    endpoint: Option<String>,

    /// Chunk cache database
    #[arg(long, global = true)]
    cache: Option<PathBuf>,

    /// Parent folder for run folders
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,
}

impl RunArgs {
    fn apply(self, config: &mut TomlConfig) {
        if let Some(audio) = self.audio {
            config.input.audio_path = audio;
            config.input.prefer_local = true;
        }
        if let Some(source_id) = self.source_id {
            config.input.source_id = Some(source_id);
        }
        if let Some(v) = self.chunk_seconds {
            config.audio.chunk_seconds = v;
        }
        if let Some(v) = self.overlap_seconds {
            config.audio.overlap_seconds = v;
        }
        if let Some(v) = self.sample_rate {
            config.audio.sample_rate = v;
        }
        if let Some(v) = self.max_parallel_chunks {
            config.pipeline.max_parallel_chunks = v;
        }
        if let Some(endpoint) = self.endpoint {
            config.oracle.endpoint = endpoint;
        }
        if let Some(cache) = self.cache {
            config.cache.sqlite_path = cache;
        }
        if let Some(dir) = self.output_dir {
            config.output.base_dir = dir;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, config_path) =
        load_resolved_config(cli.config.as_deref()).context("Failed to load configuration")?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting setscan v{} (git {}, built {}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("SETSCAN_GIT_HASH"),
        env!("SETSCAN_BUILD_TIMESTAMP"),
        env!("SETSCAN_BUILD_PROFILE"),
    );
    match &config_path {
        Some(path) => info!("Configuration: {}", path.display()),
        None => info!("No configuration file found, using defaults"),
    }

    match cli.command {
        Some(Command::InitConfig { path, force }) => init_config(path, force),
        Some(Command::Run) | None => run(config, cli.run).await,
    }
}

fn init_config(path: PathBuf, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_toml_config(&TomlConfig::default(), &path)?;
    info!("Wrote default configuration to {}", path.display());
    Ok(())
}

async fn run(mut config: TomlConfig, args: RunArgs) -> Result<()> {
    args.apply(&mut config);
    config.validate()?;

    let source_id = input::resolve_source_id(config.input.source_id.as_deref());
    info!("Source id: {}", source_id);

    let audio_path = input::resolve_audio_input(&config.input, &source_id)
        .await
        .context("Failed to resolve input audio")?;
    info!("Audio: {}", audio_path.display());

    let cache = ChunkCache::open(&config.cache.sqlite_path)
        .await
        .context("Failed to open chunk cache")?;
    info!("Chunk cache: {}", config.cache.sqlite_path.display());

    let oracle_timeout = Duration::from_secs(config.oracle.timeout_secs);
    let oracle = HttpOracle::new(
        config.oracle.endpoint.clone(),
        oracle_timeout,
        config.oracle.min_interval_ms,
    )?;
    info!("Oracle endpoint: {}", oracle.endpoint());

    let gateway = Arc::new(RecognitionGateway::new(
        Arc::new(oracle),
        oracle_timeout + ORACLE_CALL_GRACE,
    ));
    let slicer = Arc::new(AudioSlicer::new(config.audio.sample_rate));

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    let request = RunRequest {
        source_id,
        audio_path,
        settings: RunSettings::from_config(&config),
    };

    let report = match run_identification(&request, &cache, gateway, slicer, &cancel).await {
        Ok(report) => report,
        Err(Error::Cancelled) => {
            warn!("Run cancelled; finished chunks stay cached for the next run");
            cache.close().await;
            anyhow::bail!("Run cancelled");
        }
        Err(e) => {
            cache.close().await;
            return Err(e.into());
        }
    };

    let writer = ReportWriter::new(config.output.base_dir.clone());
    let run_dir = writer.write(&report, &cache).await?;
    cache.close().await;

    info!(
        "Identified {} distinct tracks from {} windows ({} cache hits, {} oracle calls)",
        report.meta.distinct_tracks,
        report.stats.windows,
        report.stats.cache_hits,
        report.stats.oracle_calls
    );
    info!("Run folder: {}", run_dir.display());

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, cancelling run");
        },
        _ = terminate => {
            info!("Received terminate signal, cancelling run");
        },
    }
}
