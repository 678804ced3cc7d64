//! HTTP client wrapper for fetching images.
//!
//! This module provides the `HttpClient` struct which streams a response body
//! to a `.part` sibling of the destination and renames it into place once the
//! body is complete.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::RETRY_AFTER;
use serde::Serialize;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, PARTIAL_SUFFIX, READ_TIMEOUT_SECS};
use super::error::DownloadError;
use crate::media::Dimensions;
use crate::user_agent::BROWSER_USER_AGENT;

/// An image fetched to local disk.
///
/// `dimensions` starts out `None` and is filled in by inspection; an upscale
/// updates `dimensions` and `byte_size` while `local_path` stays the same.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadedAsset {
    /// URL the bytes came from.
    pub source_url: String,
    /// Where the bytes were written.
    pub local_path: PathBuf,
    /// Size of the file on disk.
    pub byte_size: u64,
    /// Pixel dimensions, once known.
    pub dimensions: Option<Dimensions>,
}

/// HTTP client for fetching images with streaming support.
///
/// Create once and reuse across a batch to share the connection pool.
///
/// # Example
///
/// ```no_run
/// use harvester_core::download::HttpClient;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::new();
/// let asset = client
///     .fetch("https://cdn.example/photo.jpg", Path::new("./out/photo.jpg"))
///     .await?;
/// println!("fetched {} bytes", asset.byte_size);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a client with the browser User-Agent and default timeouts
    /// (30 s connect, 5 min overall).
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        Self::with_settings(
            BROWSER_USER_AGENT,
            Duration::from_secs(CONNECT_TIMEOUT_SECS),
            Duration::from_secs(READ_TIMEOUT_SECS),
        )
        .expect("failed to build HTTP client with static configuration")
    }

    /// Creates a client with an explicit User-Agent and timeouts.
    ///
    /// # Errors
    ///
    /// Returns the builder error when the TLS backend cannot be initialized
    /// or the User-Agent is not a valid header value.
    #[instrument(level = "debug", skip(user_agent))]
    pub fn with_settings(
        user_agent: &str,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(read_timeout)
            .gzip(true)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }

    /// Fetches `url` into `destination`.
    ///
    /// The body is streamed to `<destination>.part` and renamed onto
    /// `destination` only after the last byte is flushed, so a failed fetch
    /// never leaves a file at `destination`. An existing file at
    /// `destination` is replaced. No retries happen here.
    ///
    /// # Errors
    ///
    /// - [`DownloadError::InvalidUrl`] if `url` does not parse
    /// - [`DownloadError::Network`] / [`DownloadError::Timeout`] for transport failures
    /// - [`DownloadError::HttpStatus`] for any non-2xx response
    /// - [`DownloadError::Io`] if the file cannot be written or moved into place
    #[must_use = "fetch result carries the local path and size"]
    #[instrument(skip(self, destination), fields(url = %url, dest = %destination.display()))]
    pub async fn fetch(
        &self,
        url: &str,
        destination: &Path,
    ) -> Result<DownloadedAsset, DownloadError> {
        debug!("starting fetch");

        let parsed = Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;
        let response = self.send_request(parsed).await?;

        let partial = partial_path(destination);
        let mut file = File::create(&partial)
            .await
            .map_err(|e| DownloadError::io(partial.clone(), e))?;

        let streamed = stream_to_file(&mut file, response, url, &partial).await;
        drop(file);

        let byte_size = match streamed {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(path = %partial.display(), "cleaning up partial file after error");
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(e);
            }
        };

        if let Err(e) = tokio::fs::rename(&partial, destination).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(DownloadError::io(destination, e));
        }

        debug!(bytes = byte_size, "fetch complete");
        Ok(DownloadedAsset {
            source_url: url.to_string(),
            local_path: destination.to_path_buf(),
            byte_size,
            dimensions: None,
        })
    }

    async fn send_request(&self, url: Url) -> Result<reqwest::Response, DownloadError> {
        let url_text = url.to_string();
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                DownloadError::timeout(&url_text)
            } else {
                DownloadError::network(&url_text, e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(ToString::to_string);
            return Err(DownloadError::http_status_with_retry_after(
                url_text,
                status.as_u16(),
                retry_after,
            ));
        }

        Ok(response)
    }
}

/// `<destination>.part`.
fn partial_path(destination: &Path) -> PathBuf {
    let mut name: OsString = destination.as_os_str().to_owned();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

/// Streams response body to file, returning bytes written.
async fn stream_to_file(
    file: &mut File,
    response: reqwest::Response,
    url: &str,
    file_path: &Path,
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| {
            if e.is_timeout() {
                DownloadError::timeout(url)
            } else {
                DownloadError::network(url, e)
            }
        })?;

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(file_path.to_path_buf(), e))?;

        bytes_written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(file_path.to_path_buf(), e))?;

    Ok(bytes_written)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use crate::test_support::socket_guard::start_mock_server_or_skip;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_writes_body_to_destination() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        let temp_dir = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .and(path("/img/photo.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jpeg bytes here"))
            .mount(&mock_server)
            .await;

        let url = format!("{}/img/photo.jpg", mock_server.uri());
        let dest = temp_dir.path().join("photo.jpg");
        let asset = HttpClient::new().fetch(&url, &dest).await.unwrap();

        assert_eq!(asset.source_url, url);
        assert_eq!(asset.local_path, dest);
        assert_eq!(asset.byte_size, 15);
        assert_eq!(asset.dimensions, None);
        assert_eq!(std::fs::read(&dest).unwrap(), b"jpeg bytes here");
        assert!(!partial_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_fetch_sends_browser_user_agent() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        let temp_dir = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .and(path("/a.png"))
            .and(header("user-agent", BROWSER_USER_AGENT))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let url = format!("{}/a.png", mock_server.uri());
        let result = HttpClient::new()
            .fetch(&url, &temp_dir.path().join("a.png"))
            .await;
        assert!(result.is_ok(), "expected Ok, got {result:?}");
    }

    #[tokio::test]
    async fn test_fetch_custom_user_agent() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        let temp_dir = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .and(header("user-agent", "custom-agent/1.0"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = HttpClient::with_settings(
            "custom-agent/1.0",
            Duration::from_secs(5),
            Duration::from_secs(5),
        )
        .unwrap();
        let url = format!("{}/b.png", mock_server.uri());
        client
            .fetch(&url, &temp_dir.path().join("b.png"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_fetch_non_success_status_leaves_no_file() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        let temp_dir = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .and(path("/missing.jpg"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found page"))
            .mount(&mock_server)
            .await;

        let url = format!("{}/missing.jpg", mock_server.uri());
        let dest = temp_dir.path().join("missing.jpg");
        let result = HttpClient::new().fetch(&url, &dest).await;

        match result {
            Err(DownloadError::HttpStatus { status, .. }) => assert_eq!(status, 404),
            other => panic!("expected HttpStatus error, got: {other:?}"),
        }
        assert!(!dest.exists());
        assert!(!partial_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_fetch_429_keeps_retry_after() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        let temp_dir = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
            .mount(&mock_server)
            .await;

        let url = format!("{}/busy.jpg", mock_server.uri());
        let result = HttpClient::new()
            .fetch(&url, &temp_dir.path().join("busy.jpg"))
            .await;

        match result {
            Err(DownloadError::HttpStatus {
                status: 429,
                retry_after,
                ..
            }) => assert_eq!(retry_after.as_deref(), Some("7")),
            other => panic!("expected 429, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_replaces_existing_file() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("photo.jpg");
        std::fs::write(&dest, b"stale content from an earlier run").unwrap();

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"fresh"))
            .mount(&mock_server)
            .await;

        let url = format!("{}/photo.jpg", mock_server.uri());
        HttpClient::new().fetch(&url, &dest).await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"fresh");
    }

    #[tokio::test]
    async fn test_fetch_timeout_leaves_no_file() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        let temp_dir = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"late")
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&mock_server)
            .await;

        let client = HttpClient::with_settings(
            BROWSER_USER_AGENT,
            Duration::from_secs(1),
            Duration::from_millis(300),
        )
        .unwrap();
        let url = format!("{}/slow.jpg", mock_server.uri());
        let dest = temp_dir.path().join("slow.jpg");
        let result = client.fetch(&url, &dest).await;

        assert!(
            matches!(result, Err(DownloadError::Timeout { .. })),
            "expected timeout, got {result:?}"
        );
        assert!(!dest.exists());
        assert!(!partial_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_fetch_invalid_url() {
        let temp_dir = TempDir::new().unwrap();
        let result = HttpClient::new()
            .fetch("not-a-valid-url", &temp_dir.path().join("x.jpg"))
            .await;
        assert!(matches!(result, Err(DownloadError::InvalidUrl { .. })));
    }

    #[test]
    fn test_partial_path_appends_suffix() {
        assert_eq!(
            partial_path(Path::new("/out/a.jpg")),
            PathBuf::from("/out/a.jpg.part")
        );
    }
}
