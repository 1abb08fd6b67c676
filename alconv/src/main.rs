//! alconv - batch converter to Apple Lossless / AAC in MPEG-4 containers
//!
//! Every input file is converted in order, one at a time. Files that cannot
//! be opened or encoded are reported and skipped.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use alconv::audio::{FfmpegMuxerFactory, SymphoniaDecoderFactory};
use alconv::config::{CliOverrides, Settings};
use alconv::pipeline::{BatchOrchestrator, BatchSummary, Scheduler};
use alconv_common::config::load_toml_config;

/// Command-line arguments for alconv
#[derive(Parser, Debug)]
#[command(name = "alconv")]
#[command(about = "Convert audio files to Apple Lossless or AAC (.m4a)")]
#[command(version)]
struct Args {
    /// Files to convert
    #[arg(required = true, num_args = 1..)]
    files: Vec<PathBuf>,

    /// Encode to AAC instead of Apple Lossless
    #[arg(short, long)]
    compress: bool,

    /// Lossless bit depth cap (16, 20, 24 or 32; 0 keeps the source depth)
    #[arg(short, long, allow_negative_numbers = true)]
    bits_per_sample: Option<i32>,

    /// Output directory
    #[arg(short, long, env = "ALCONV_OUTPUT_DIR")]
    output: Option<PathBuf>,

    /// Overwrite existing output files
    #[arg(short, long)]
    force: bool,

    /// ffmpeg executable
    #[arg(long, env = "ALCONV_FFMPEG")]
    ffmpeg: Option<PathBuf>,

    /// Configuration file
    #[arg(long, env = "ALCONV_CONFIG")]
    config: Option<PathBuf>,
}

impl Args {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            output_dir: self.output.clone(),
            compress: self.compress,
            bits_per_sample: self.bits_per_sample,
            overwrite: self.force,
            ffmpeg_path: self.ffmpeg.clone(),
        }
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(summary) if summary.has_failures() => ExitCode::FAILURE,
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("alconv: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<BatchSummary> {
    let args = Args::parse();

    let toml = load_toml_config(args.config.as_deref()).context("Failed to load configuration")?;
    let settings = Settings::resolve(&args.overrides(), &toml).context("Invalid configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| settings.log_filter.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("alconv {}", env!("CARGO_PKG_VERSION"));
    info!("Output directory: {}", settings.batch.output_dir.display());

    let mut scheduler = Scheduler::new();
    scheduler.start().context("Failed to start runtime")?;

    let cancel = scheduler.cancellation_token();
    scheduler.spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, finishing current file");
                cancel.cancel();
            }
        }
    })?;

    let orchestrator = BatchOrchestrator::new(
        Arc::new(SymphoniaDecoderFactory),
        Arc::new(FfmpegMuxerFactory::new(settings.muxer.clone())),
        &settings.batch,
    )
    .with_cancellation(cancel);

    let summary = scheduler.block_on(orchestrator.process(
        args.files.clone(),
        &settings.batch.output_dir,
        &settings.options,
    ))?;

    scheduler.stop();

    report(&summary);
    Ok(summary)
}

fn report(summary: &BatchSummary) {
    info!(
        "{} converted, {} skipped, {} cancelled",
        summary.completed.len(),
        summary.failed.len(),
        summary.cancelled
    );

    let truncated = summary.truncated();
    if truncated > 0 {
        warn!("{} output(s) may be truncated by read errors", truncated);
    }

    let failed_writes = summary.failed_writes();
    if failed_writes > 0 {
        error!("{} output(s) failed to encode", failed_writes);
    }

    for (source, reason) in &summary.failed {
        error!("{}: {}", source.display(), reason);
    }
}
