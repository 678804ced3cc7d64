//! Errors that stop a whole run.
//!
//! Per-asset failures never appear here; they are recorded in the
//! [`BatchReport`](super::BatchReport).

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::manifest::ManifestError;

/// Fatal pipeline errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The input document has no content to extract from.
    #[error("document is empty")]
    EmptyDocument,

    /// The destination directory could not be created.
    #[error("cannot create destination directory {path}: {source}")]
    CreateDir {
        /// Directory path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A directory to normalize could not be listed.
    #[error("cannot list directory {path}: {source}")]
    ReadDir {
        /// Directory path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The URL list could not be read or written.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// The configuration is out of range.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The HTTP client could not be built from the configuration.
    #[error("cannot build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// Semaphore was closed unexpectedly.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}

impl PipelineError {
    /// Creates a directory-creation error.
    pub fn create_dir(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::CreateDir {
            path: path.into(),
            source,
        }
    }

    /// Creates a directory-listing error.
    pub fn read_dir(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadDir {
            path: path.into(),
            source,
        }
    }
}
