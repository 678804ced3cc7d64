//! Pipeline tunables.
//!
//! Every knob the pipeline consults lives in [`PipelineConfig`], which is
//! built once and handed to [`Pipeline::new`](crate::pipeline::Pipeline::new).

use std::time::Duration;

use thiserror::Error;

use crate::download::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use crate::user_agent::BROWSER_USER_AGENT;

/// Default minimum pixel dimension on both axes.
pub const DEFAULT_MIN_DIMENSION: u32 = 700;

/// Default delay between successive requests to the same origin.
pub const DEFAULT_PACING: Duration = Duration::from_millis(100);

/// Default number of assets processed concurrently.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Upper bound for [`PipelineConfig::concurrency`].
pub const MAX_CONCURRENCY: usize = 32;

/// Upper bound for [`PipelineConfig::max_attempts`].
pub const MAX_ATTEMPTS: u32 = 10;

/// File extensions treated as images (lowercase, with leading dot).
pub const DEFAULT_SUPPORTED_EXTENSIONS: &[&str] =
    &[".jpg", ".jpeg", ".png", ".webp", ".gif", ".bmp", ".tiff"];

/// Class-name fragments that mark a page's main content container.
pub const DEFAULT_CONTENT_CLASS_HINTS: &[&str] = &[
    "post-content",
    "entry-content",
    "article-content",
    "article-body",
    "post-body",
    "story-body",
];

/// Invalid pipeline settings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The floor must be a positive pixel count.
    #[error("minimum dimension must be at least 1 pixel")]
    ZeroMinDimension,

    /// Concurrency outside `1..=MAX_CONCURRENCY`.
    #[error("concurrency {value} out of range (expected 1..={max})")]
    Concurrency {
        /// Rejected value.
        value: usize,
        /// Inclusive upper bound.
        max: usize,
    },

    /// Attempt count outside `1..=MAX_ATTEMPTS`.
    #[error("max attempts {value} out of range (expected 1..={max})")]
    Attempts {
        /// Rejected value.
        value: u32,
        /// Inclusive upper bound.
        max: u32,
    },

    /// A timeout of zero would fail every request.
    #[error("{field} must be greater than zero")]
    ZeroTimeout {
        /// Name of the offending setting.
        field: &'static str,
    },

    /// No extensions means no file would ever be inspected.
    #[error("supported extension list is empty")]
    NoExtensions,

    /// Extension entries must look like `.ext`.
    #[error("invalid extension '{value}' (expected a leading dot, e.g. \".jpg\")")]
    Extension {
        /// Rejected entry.
        value: String,
    },

    /// The User-Agent header value is empty.
    #[error("user agent must not be empty")]
    EmptyUserAgent,
}

/// Explicit configuration for one pipeline instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Minimum acceptable width and height in pixels.
    pub min_dimension: u32,
    /// Extensions (lowercase, leading dot) of files that are inspected and upscaled.
    pub supported_extensions: Vec<String>,
    /// Minimum delay between requests to the same origin host.
    pub pacing: Duration,
    /// Class-name fragments used to narrow extraction to the content block.
    pub content_class_hints: Vec<String>,
    /// Number of assets processed at once.
    pub concurrency: usize,
    /// Total fetch attempts per asset (1 disables retry).
    pub max_attempts: u32,
    /// HTTP connect timeout.
    pub connect_timeout: Duration,
    /// Whole-request timeout, including the body stream.
    pub read_timeout: Duration,
    /// `User-Agent` sent with every fetch.
    pub user_agent: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_dimension: DEFAULT_MIN_DIMENSION,
            supported_extensions: DEFAULT_SUPPORTED_EXTENSIONS
                .iter()
                .map(ToString::to_string)
                .collect(),
            pacing: DEFAULT_PACING,
            content_class_hints: DEFAULT_CONTENT_CLASS_HINTS
                .iter()
                .map(ToString::to_string)
                .collect(),
            concurrency: DEFAULT_CONCURRENCY,
            max_attempts: 1,
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(READ_TIMEOUT_SECS),
            user_agent: BROWSER_USER_AGENT.to_string(),
        }
    }
}

impl PipelineConfig {
    /// Checks every field against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_dimension == 0 {
            return Err(ConfigError::ZeroMinDimension);
        }
        if !(1..=MAX_CONCURRENCY).contains(&self.concurrency) {
            return Err(ConfigError::Concurrency {
                value: self.concurrency,
                max: MAX_CONCURRENCY,
            });
        }
        if !(1..=MAX_ATTEMPTS).contains(&self.max_attempts) {
            return Err(ConfigError::Attempts {
                value: self.max_attempts,
                max: MAX_ATTEMPTS,
            });
        }
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout {
                field: "connect_timeout",
            });
        }
        if self.read_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout {
                field: "read_timeout",
            });
        }
        if self.supported_extensions.is_empty() {
            return Err(ConfigError::NoExtensions);
        }
        if let Some(bad) = self
            .supported_extensions
            .iter()
            .find(|ext| ext.len() < 2 || !ext.starts_with('.'))
        {
            return Err(ConfigError::Extension { value: bad.clone() });
        }
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::EmptyUserAgent);
        }
        Ok(())
    }

    /// Returns true when `file_name` ends with one of the supported extensions
    /// (compared case-insensitively).
    #[must_use]
    pub fn is_supported_file(&self, file_name: &str) -> bool {
        let lower = file_name.to_ascii_lowercase();
        self.supported_extensions
            .iter()
            .any(|ext| lower.len() > ext.len() && lower.ends_with(&ext.to_ascii_lowercase()))
    }
}

/// Normalizes an extension entry to lowercase with a leading dot.
#[must_use]
pub fn normalize_extension(raw: &str) -> String {
    let trimmed = raw.trim().to_ascii_lowercase();
    if trimmed.starts_with('.') {
        trimmed
    } else {
        format!(".{trimmed}")
    }
}
