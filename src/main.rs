//! CLI entry point for the harvester tool.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use harvester_core::{
    BatchReport, Document, MANIFEST_FILE_NAME, Pipeline, PipelineConfig, RAW_HTML_FILE_NAME,
    REPORT_FILE_NAME, WatchOptions, discover_document_url, read_manifest,
};
use tracing::{debug, info, warn};

mod app_config;
mod cli;
mod exit_handler;

use app_config::FileConfig;
use cli::Args;

/// Process exit outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    /// Every asset succeeded, or there were none.
    Success,
    /// Some assets succeeded and some failed.
    Partial,
    /// Nothing succeeded, the run was interrupted, or a fatal error occurred.
    Failure,
}

impl From<ProcessExit> for ExitCode {
    fn from(exit: ProcessExit) -> Self {
        match exit {
            ProcessExit::Success => ExitCode::SUCCESS,
            ProcessExit::Partial => ExitCode::from(2),
            ProcessExit::Failure => ExitCode::FAILURE,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    match run(args).await {
        Ok(exit) => exit.into(),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ProcessExit::Failure.into()
        }
    }
}

async fn run(args: Args) -> Result<ProcessExit> {
    let file_config = app_config::load_file_config(args.config.as_deref())?;
    init_tracing(&args, file_config.as_ref());

    debug!(?args, "CLI arguments parsed");
    info!(dir = %args.dir.display(), "Harvester starting");

    let config = build_pipeline_config(&args, file_config.as_ref());
    let pipeline = Pipeline::new(config).context("Invalid pipeline configuration")?;

    if args.upscale_only {
        let report = pipeline.normalize_directory(&args.dir).await?;
        return finish(&args, &report);
    }

    if args.watch {
        let options = WatchOptions {
            settle: args
                .settle_ms
                .map_or(WatchOptions::default().settle, Duration::from_millis),
            ..WatchOptions::default()
        };
        let report = pipeline
            .watch_directory(&args.dir, options, interrupt_flag())
            .await?;
        finish(&args, &report)?;
        // Ctrl+C is the normal way out of a watch; per-file failures were logged.
        return Ok(ProcessExit::Success);
    }

    if let Some(html_path) = saved_page_path(&args) {
        let document = load_document(&html_path, args.base_url.clone())?;
        pipeline
            .write_url_list(&document, &args.dir)
            .await
            .with_context(|| format!("Failed to extract images from '{}'", html_path.display()))?;
    } else if args.extract_only {
        bail!(
            "--extract-only needs a saved page: pass --html or place {RAW_HTML_FILE_NAME} in '{}'",
            args.dir.display()
        );
    }

    if args.extract_only {
        return Ok(ProcessExit::Success);
    }

    let manifest_path = args.dir.join(MANIFEST_FILE_NAME);
    let urls = read_manifest(&manifest_path).with_context(|| {
        format!(
            "No saved page and no URL list in '{}'",
            args.dir.display()
        )
    })?;

    let report = pipeline
        .run_interruptible(&urls, &args.dir, interrupt_flag())
        .await?;
    finish(&args, &report)
}

/// Flag set once Ctrl+C is received.
fn interrupt_flag() -> Arc<AtomicBool> {
    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_signal = Arc::clone(&interrupted);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; finishing images in flight");
            interrupted_signal.store(true, Ordering::SeqCst);
        }
    });
    interrupted
}

/// Priority: RUST_LOG env var > quiet flag > verbose flag > config file > info.
fn init_tracing(args: &Args, file_config: Option<&FileConfig>) {
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => file_config
                .and_then(|cfg| cfg.verbosity)
                .map_or("info", app_config::VerbositySetting::filter_directive),
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Precedence: CLI flag > config file > built-in default.
fn build_pipeline_config(args: &Args, file_config: Option<&FileConfig>) -> PipelineConfig {
    let mut config = PipelineConfig::default();

    if let Some(file) = file_config {
        if let Some(min_dimension) = file.min_dimension {
            config.min_dimension = min_dimension;
        }
        if let Some(concurrency) = file.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(pacing_ms) = file.pacing_ms {
            config.pacing = Duration::from_millis(pacing_ms);
        }
        if let Some(max_retries) = file.max_retries {
            config.max_attempts = max_retries.saturating_add(1);
        }
        if let Some(hints) = &file.content_hints {
            config.content_class_hints.clone_from(hints);
        }
        if let Some(extensions) = &file.extensions {
            config.supported_extensions.clone_from(extensions);
        }
        if let Some(secs) = file.connect_timeout_secs {
            config.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.read_timeout_secs {
            config.read_timeout = Duration::from_secs(secs);
        }
    }

    if let Some(min_dimension) = args.min_dimension {
        config.min_dimension = min_dimension;
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency = usize::from(concurrency);
    }
    if let Some(pacing_ms) = args.pacing {
        config.pacing = Duration::from_millis(pacing_ms);
    }
    if let Some(max_retries) = args.max_retries {
        config.max_attempts = u32::from(max_retries) + 1;
    }

    config
}

/// `--html`, else `DIR/raw.html` when it exists.
fn saved_page_path(args: &Args) -> Option<PathBuf> {
    if let Some(path) = &args.html {
        return Some(path.clone());
    }
    let default = args.dir.join(RAW_HTML_FILE_NAME);
    default.is_file().then_some(default)
}

fn load_document(path: &Path, base_url: Option<url::Url>) -> Result<Document> {
    let raw_html = fs::read_to_string(path)
        .with_context(|| format!("Failed to read saved page '{}'", path.display()))?;
    let base_url = match base_url {
        Some(url) => url,
        None => discover_document_url(&raw_html).with_context(|| {
            format!(
                "No --base-url given and '{}' has no canonical or og:url link",
                path.display()
            )
        })?,
    };
    debug!(base = %base_url, "resolving references against base URL");
    Ok(Document::new(raw_html, base_url))
}

fn finish(args: &Args, report: &BatchReport) -> Result<ProcessExit> {
    if args.report {
        write_report(&args.dir, report)?;
    }

    let summary = report.summary();
    if !args.quiet {
        println!(
            "{} images: {} done ({} upscaled), {} failed, {} cancelled",
            summary.total,
            summary.done,
            summary.upscaled,
            summary.failed(),
            summary.cancelled
        );
    }
    if report.interrupted {
        warn!(
            done = summary.done,
            cancelled = summary.cancelled,
            "Interrupted. Run again to finish."
        );
    }
    Ok(exit_handler::determine_exit_outcome(report))
}

fn write_report(dir: &Path, report: &BatchReport) -> Result<()> {
    let path = dir.join(REPORT_FILE_NAME);
    let json = serde_json::to_vec_pretty(report).context("Failed to serialize report")?;
    fs::write(&path, json)
        .with_context(|| format!("Failed to write report '{}'", path.display()))?;
    info!(path = %path.display(), "wrote outcome report");
    Ok(())
}
