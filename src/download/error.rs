//! Error types for the download module.
//!
//! Every variant carries the URL or path it concerns so a per-asset failure
//! can be reported without further context.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while fetching an image.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Non-success HTTP response.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// The Retry-After header value, if present (for 429 responses).
        retry_after: Option<String>,
    },

    /// File system error while writing the asset.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after: None,
        }
    }

    /// Creates an HTTP status error with a Retry-After header value.
    pub fn http_status_with_retry_after(
        url: impl Into<String>,
        status: u16,
        retry_after: Option<String>,
    ) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Returns the HTTP status for [`DownloadError::HttpStatus`].
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Short machine-readable label used in outcome reports.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network { .. } => "network",
            Self::Timeout { .. } => "timeout",
            Self::HttpStatus { .. } => "http_status",
            Self::Io { .. } => "io",
            Self::InvalidUrl { .. } => "invalid_url",
        }
    }
}

// No From<reqwest::Error> / From<io::Error>: every variant needs the URL or
// path, which the source errors do not carry.

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_download_error_timeout_display() {
        let error = DownloadError::timeout("https://example.com/a.jpg");
        assert!(error.to_string().contains("timeout"));
        assert!(error.to_string().contains("https://example.com/a.jpg"));
        assert_eq!(error.kind(), "timeout");
    }

    #[test]
    fn test_download_error_http_status_display() {
        let error = DownloadError::http_status("https://example.com/a.jpg", 404);
        let msg = error.to_string();
        assert!(msg.contains("404"), "Expected '404' in: {msg}");
        assert!(
            msg.contains("https://example.com/a.jpg"),
            "Expected URL in: {msg}"
        );
        assert_eq!(error.status(), Some(404));
    }

    #[test]
    fn test_download_error_retry_after_is_kept() {
        let error = DownloadError::http_status_with_retry_after(
            "https://example.com/a.jpg",
            429,
            Some("5".to_string()),
        );
        match error {
            DownloadError::HttpStatus { retry_after, .. } => {
                assert_eq!(retry_after.as_deref(), Some("5"));
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_download_error_io_display() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let error = DownloadError::io(PathBuf::from("/tmp/a.jpg"), io_error);
        let msg = error.to_string();
        assert!(msg.contains("/tmp/a.jpg"), "Expected path in: {msg}");
        assert_eq!(error.status(), None);
    }

    #[test]
    fn test_download_error_invalid_url_display() {
        let error = DownloadError::invalid_url("not-a-url");
        let msg = error.to_string();
        assert!(
            msg.contains("invalid URL"),
            "Expected 'invalid URL' in: {msg}"
        );
        assert!(msg.contains("not-a-url"), "Expected URL in: {msg}");
        assert_eq!(error.kind(), "invalid_url");
    }
}
