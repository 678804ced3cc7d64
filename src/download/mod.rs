//! Fetching image bytes to disk.
//!
//! # Features
//!
//! - Streaming fetches (the body is never buffered whole in memory)
//! - `.part` staging so failed fetches leave nothing at the destination
//! - Batch-wide destination naming with explicit collision suffixes
//! - Per-origin pacing and retry classification for the orchestrator
//!
//! # Example
//!
//! ```no_run
//! use harvester_core::download::{HttpClient, plan_file_names};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let urls = ["https://cdn.example/a.jpg"];
//! let plan = plan_file_names(&urls, &[]);
//! let client = HttpClient::new();
//! let asset = client
//!     .fetch(urls[0], &Path::new("./out").join(&plan[0].file_name))
//!     .await?;
//! println!("{}", asset.local_path.display());
//! # Ok(())
//! # }
//! ```

mod client;
pub mod constants;
mod error;
mod filename;
pub mod rate_limiter;
mod retry;

pub use client::{DownloadedAsset, HttpClient};
pub use error::DownloadError;
pub use filename::{PlannedName, name_from_url, placeholder_name, plan_file_names};
pub use rate_limiter::{RateLimiter, extract_domain, parse_retry_after};
pub use retry::{FailureType, RetryDecision, RetryPolicy, classify_error, server_retry_after};

// No module-local Result alias: signatures spell out `Result<T, DownloadError>`.
