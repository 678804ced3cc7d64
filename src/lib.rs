//! Harvester Core Library
//!
//! Finds the article images in a saved web page, downloads them, and makes
//! sure every one of them is at least a minimum size on both axes.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`extract`] - Heuristic image-reference scanning of raw HTML
//! - [`resolve`] - Relative reference resolution and filtering
//! - [`download`] - Streaming HTTP fetches, naming, pacing, retry
//! - [`media`] - Dimension inspection and aspect-preserving upscaling
//! - [`pipeline`] - Per-asset orchestration and the batch report
//! - [`manifest`] - The `images.txt` URL list
//! - [`config`] - Pipeline tunables

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod download;
pub mod extract;
pub mod manifest;
pub mod media;
pub mod pipeline;
pub mod resolve;
pub mod user_agent;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use config::{ConfigError, PipelineConfig};
pub use download::{DownloadError, DownloadedAsset, HttpClient};
pub use extract::{CandidateExtractor, Document, ResolvedUrlSet, discover_document_url};
pub use manifest::{MANIFEST_FILE_NAME, ManifestError, read_manifest, write_manifest};
pub use media::{Dimensions, MediaError};
pub use pipeline::{
    AssetOutcome, AssetStatus, BatchReport, BatchSummary, Pipeline, PipelineError,
    RAW_HTML_FILE_NAME, REPORT_FILE_NAME, WatchOptions,
};
pub use resolve::{Rejection, ResolvedUrl, resolve};
