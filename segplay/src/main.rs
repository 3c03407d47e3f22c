//! segplay - command-line front-end
//!
//! Plays whole files or short segments through the playback orchestrator,
//! prunes the on-disk caches, and reports which external tools were found.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use segplay::playback::{Orchestrator, SegmentOptions};
use segplay::{EngineConfig, Tool, ToolResolver};
use segplay_common::config::{ensure_dir, ConfigResolver};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Poll interval while waiting for playback to finish
const WAIT_POLL: Duration = Duration::from_millis(100);

/// Command-line arguments for segplay
#[derive(Parser, Debug)]
#[command(name = "segplay")]
#[command(about = "Low-latency audio segment player")]
#[command(version)]
struct Args {
    /// Config file (overrides SEGPLAY_CONFIG and the platform default)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Cache folder (overrides SEGPLAY_CACHE_DIR and the config file)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Play a whole file
    Play { file: PathBuf },

    /// Play a time window of a file
    Segment {
        file: PathBuf,

        /// Window start, seconds
        #[arg(long)]
        start: f64,

        /// Window end, seconds (default: start + min duration)
        #[arg(long)]
        end: Option<f64>,

        #[arg(long, default_value_t = 0.0)]
        pad_before: f64,

        #[arg(long, default_value_t = 0.0)]
        pad_after: f64,

        /// Shortest window that will be played, seconds
        #[arg(long)]
        min_duration: Option<f64>,
    },

    /// Delete cache files older than the given age
    PruneCache {
        #[arg(long, default_value_t = 30)]
        max_age_days: u32,
    },

    /// Show which external tools were found
    Tools,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let resolver = ConfigResolver::new("segplay");
    let loaded = resolver.try_load(args.config.as_deref());

    // Initialize tracing
    let level = if args.verbose {
        "debug".to_string()
    } else {
        resolver.resolve_log_level(loaded.as_ref().ok())
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("segplay={level},segplay_common={level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let toml = match loaded {
        Ok(toml) => toml,
        Err(e) => {
            warn!(error = %e, "Ignoring config file, using defaults");
            Default::default()
        }
    };

    let cache_dir = resolver.resolve_cache_dir(args.cache_dir.as_deref(), &toml);
    ensure_dir(&cache_dir)
        .with_context(|| format!("Failed to create cache folder {}", cache_dir.display()))?;
    info!("Cache folder: {}", cache_dir.display());

    let config =
        EngineConfig::from_toml(cache_dir, &toml).context("Invalid configuration values")?;
    let tools = Arc::new(ToolResolver::from_config(&toml.tools));

    let mut orchestrator = Orchestrator::builder(config)
        .tools(tools)
        .warning_handler(Arc::new(|message: &str| eprintln!("segplay: {message}")))
        .build()
        .context("Failed to initialize playback orchestrator")?;

    let started = match args.command {
        Command::Play { file } => orchestrator.play_file(&file).await,
        Command::Segment {
            file,
            start,
            end,
            pad_before,
            pad_after,
            min_duration,
        } => {
            let options = SegmentOptions {
                pad_before,
                pad_after,
                min_duration: min_duration.unwrap_or(orchestrator.config().min_duration),
            };
            orchestrator.play_segment(&file, start, end, options).await
        }
        Command::PruneCache { max_age_days } => {
            let removed = orchestrator.prune_caches(max_age_days);
            println!("Removed {removed} cache file(s)");
            return Ok(());
        }
        Command::Tools => {
            print_tools(orchestrator.tools());
            return Ok(());
        }
    };

    if !started {
        orchestrator.cleanup().await;
        bail!("Playback could not be started");
    }
    info!(status = %orchestrator.status(), "Playback started");

    tokio::select! {
        _ = wait_until_finished(&mut orchestrator) => {
            info!("Playback finished");
        }
        _ = shutdown_signal() => {
            info!("Interrupted, stopping playback");
        }
    }

    orchestrator.cleanup().await;
    Ok(())
}

fn print_tools(tools: &ToolResolver) {
    for tool in Tool::ALL {
        let name = tool.to_string();
        match tools.resolve(tool) {
            Some(path) => println!("{name:<18} {}", path.display()),
            None => println!("{name:<18} (not found)"),
        }
    }
}

async fn wait_until_finished(orchestrator: &mut Orchestrator) {
    while orchestrator.is_playing() {
        tokio::time::sleep(WAIT_POLL).await;
    }
}

/// Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
