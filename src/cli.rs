//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;
use url::Url;

/// Harvest article images from a saved web page and normalize their size.
///
/// DIR holds the run: `raw.html` (the saved page, optional), `images.txt`
/// (the extracted URL list) and the downloaded images.
#[derive(Parser, Debug)]
#[command(name = "harvester")]
#[command(author, version, about)]
pub struct Args {
    /// Directory holding raw.html / images.txt and receiving the images
    #[arg(value_name = "DIR")]
    pub dir: PathBuf,

    /// Saved page to extract from (default: DIR/raw.html when present)
    #[arg(long, value_name = "FILE")]
    pub html: Option<PathBuf>,

    /// URL the page was saved from, for resolving relative references
    /// (default: the page's canonical or og:url link)
    #[arg(long, value_name = "URL")]
    pub base_url: Option<Url>,

    /// Stop after writing images.txt
    #[arg(long, conflicts_with = "upscale_only")]
    pub extract_only: bool,

    /// Only inspect and upscale the images already in DIR (no network)
    #[arg(long)]
    pub upscale_only: bool,

    /// Keep watching DIR and upscale images as they are written, until Ctrl+C
    #[arg(long, conflicts_with_all = ["extract_only", "upscale_only", "html", "base_url"])]
    pub watch: bool,

    /// How long a watched file must stay unchanged before it is processed, in milliseconds
    #[arg(
        long,
        value_name = "MS",
        requires = "watch",
        value_parser = clap::value_parser!(u64).range(0..=60000)
    )]
    pub settle_ms: Option<u64>,

    /// Write the per-asset outcome log to DIR/harvest-report.json
    #[arg(long)]
    pub report: bool,

    /// Config file (default: $XDG_CONFIG_HOME/harvester/config.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Images processed at once (1-32)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=32))]
    pub concurrency: Option<u8>,

    /// Minimum delay between requests to the same host in milliseconds (0 to disable, max 60000)
    #[arg(short = 'l', long, value_parser = clap::value_parser!(u64).range(0..=60000))]
    pub pacing: Option<u64>,

    /// Retry attempts for transient fetch failures (0-9)
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u8).range(0..=9))]
    pub max_retries: Option<u8>,

    /// Minimum width and height in pixels
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub min_dimension: Option<u32>,
}
