//! Batch orchestration: fetch, inspect and upscale each asset in isolation.
//!
//! The pipeline takes an ordered list of image URLs and a destination
//! directory. Destination names are planned for the whole batch up front,
//! then each asset runs in its own Tokio task:
//!
//! ```text
//! Pending -> Fetching -> FetchFailed
//!                     -> Inspecting -> InspectFailed (file kept)
//!                                   -> Upscaling -> Done
//!                                                -> UpscaleFailed (original kept)
//! ```
//!
//! # Concurrency Model
//!
//! - A semaphore bounds the number of assets in flight
//! - Requests to the same origin are paced by a shared [`RateLimiter`]
//! - Decoding and resampling run on the blocking pool
//! - Outcomes are reassembled in input order
//!
//! # Example
//!
//! ```no_run
//! use harvester_core::{Pipeline, PipelineConfig};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pipeline = Pipeline::new(PipelineConfig::default())?;
//! let urls = vec!["https://cdn.example/a.jpg".to_string()];
//! let report = pipeline.run(&urls, Path::new("./out")).await?;
//! println!("{:?}", report.summary());
//! # Ok(())
//! # }
//! ```

mod error;
mod outcome;
mod watch;

pub use error::PipelineError;
pub use outcome::{AssetOutcome, AssetStatus, BatchReport, BatchSummary};
pub use watch::{DEFAULT_POLL_INTERVAL, DEFAULT_SETTLE, WatchOptions, is_ignored_name};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::StreamExt;
use futures_util::stream;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use crate::config::PipelineConfig;
use crate::download::{
    DownloadError, DownloadedAsset, FailureType, HttpClient, PlannedName, RateLimiter,
    RetryDecision, RetryPolicy, classify_error, plan_file_names, server_retry_after,
};
use crate::extract::{CandidateExtractor, Document, ResolvedUrlSet};
use crate::manifest::{MANIFEST_FILE_NAME, read_manifest, write_manifest};
use crate::media::{self, Dimensions};

/// Name of the JSON outcome log the binary writes next to the assets.
pub const REPORT_FILE_NAME: &str = "harvest-report.json";

/// Name of the saved page the binary extracts from.
pub const RAW_HTML_FILE_NAME: &str = "raw.html";

/// File names assets may never take, since the run itself writes them.
const RESERVED_NAMES: &[&str] = &[MANIFEST_FILE_NAME, REPORT_FILE_NAME, RAW_HTML_FILE_NAME];

/// Image extraction and normalization pipeline.
///
/// Build once per configuration; the HTTP connection pool and per-origin
/// pacing state are shared by every batch the pipeline runs.
#[derive(Debug, Clone)]
pub struct Pipeline {
    extractor: CandidateExtractor,
    worker: AssetWorker,
}

/// Everything one asset task needs, cheap to clone into the task.
#[derive(Debug, Clone)]
struct AssetWorker {
    config: Arc<PipelineConfig>,
    client: HttpClient,
    rate_limiter: Arc<RateLimiter>,
    retry_policy: RetryPolicy,
}

impl Pipeline {
    /// Creates a pipeline from a validated configuration.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::Config`] if a tunable is out of range
    /// - [`PipelineError::Client`] if the HTTP client cannot be built
    #[instrument(level = "debug", skip_all, fields(
        min_dimension = config.min_dimension,
        concurrency = config.concurrency,
        pacing_ms = config.pacing.as_millis(),
    ))]
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let client = HttpClient::with_settings(
            &config.user_agent,
            config.connect_timeout,
            config.read_timeout,
        )
        .map_err(PipelineError::Client)?;
        Ok(Self::assemble(config, client))
    }

    /// Creates a pipeline around an existing client.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] when `config` fails validation.
    pub fn with_client(
        config: PipelineConfig,
        client: HttpClient,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self::assemble(config, client))
    }

    fn assemble(config: PipelineConfig, client: HttpClient) -> Self {
        let extractor = CandidateExtractor::new(config.content_class_hints.iter().cloned());
        let rate_limiter = Arc::new(RateLimiter::from_delay(config.pacing));
        let retry_policy = RetryPolicy::with_max_attempts(config.max_attempts);
        debug!(
            max_attempts = retry_policy.max_attempts(),
            pacing_disabled = rate_limiter.is_disabled(),
            "creating pipeline"
        );
        Self {
            extractor,
            worker: AssetWorker {
                config: Arc::new(config),
                client,
                rate_limiter,
                retry_policy,
            },
        }
    }

    /// Returns the configuration this pipeline runs with.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.worker.config
    }

    /// Returns the extractor built from the configured content hints.
    #[must_use]
    pub fn extractor(&self) -> &CandidateExtractor {
        &self.extractor
    }

    /// Extracts the image URLs of `document` and writes them to
    /// `<dest_dir>/images.txt`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::EmptyDocument`] if the document is blank
    /// - [`PipelineError::CreateDir`] if the directory cannot be created
    /// - [`PipelineError::Manifest`] if the list cannot be written
    #[instrument(skip(self, document, dest_dir), fields(base = %document.base_url(), dest = %dest_dir.display()))]
    pub async fn write_url_list(
        &self,
        document: &Document,
        dest_dir: &Path,
    ) -> Result<ResolvedUrlSet, PipelineError> {
        if document.is_blank() {
            return Err(PipelineError::EmptyDocument);
        }
        create_dest_dir(dest_dir).await?;

        let urls = self.extractor.extract(document);
        let manifest_path = dest_dir.join(MANIFEST_FILE_NAME);
        if manifest_path.is_file() {
            match read_manifest(&manifest_path) {
                Ok(previous) if previous == urls.to_strings() => {
                    debug!(count = previous.len(), "image URL list unchanged");
                }
                Ok(previous) => info!(
                    path = %manifest_path.display(),
                    previous = previous.len(),
                    current = urls.len(),
                    "replacing existing image URL list"
                ),
                Err(e) => info!(
                    path = %manifest_path.display(),
                    error = %e,
                    "replacing unreadable image URL list"
                ),
            }
        }
        write_manifest(&manifest_path, &urls)?;
        info!(count = urls.len(), "wrote image URL list");
        Ok(urls)
    }

    /// Runs the full sequence for one page: extraction, the URL list, then
    /// fetch/inspect/upscale of every discovered image.
    ///
    /// # Errors
    ///
    /// Same as [`write_url_list`](Self::write_url_list) and [`run`](Self::run).
    pub async fn harvest_document(
        &self,
        document: &Document,
        dest_dir: &Path,
    ) -> Result<BatchReport, PipelineError> {
        let urls = self.write_url_list(document, dest_dir).await?;
        self.run(&urls.to_strings(), dest_dir).await
    }

    /// Fetches, inspects and upscales every URL into `dest_dir`.
    ///
    /// # Errors
    ///
    /// Only fatal conditions are errors; see [`run_interruptible`](Self::run_interruptible).
    pub async fn run<S: AsRef<str>>(
        &self,
        urls: &[S],
        dest_dir: &Path,
    ) -> Result<BatchReport, PipelineError> {
        self.run_interruptible(urls, dest_dir, Arc::new(AtomicBool::new(false)))
            .await
    }

    /// Like [`run`](Self::run), but stops claiming new assets once
    /// `interrupted` is set.
    ///
    /// Assets already in flight finish normally; assets not yet started are
    /// reported as [`AssetStatus::Cancelled`]. Individual asset failures do
    /// NOT cause this method to error.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::CreateDir`] if `dest_dir` cannot be created
    /// - [`PipelineError::SemaphoreClosed`] if the semaphore is closed
    #[instrument(skip(self, urls, dest_dir, interrupted), fields(count = urls.len(), dest = %dest_dir.display()))]
    pub async fn run_interruptible<S: AsRef<str>>(
        &self,
        urls: &[S],
        dest_dir: &Path,
        interrupted: Arc<AtomicBool>,
    ) -> Result<BatchReport, PipelineError> {
        create_dest_dir(dest_dir).await?;

        let plan = plan_file_names(urls, RESERVED_NAMES);
        let semaphore = Arc::new(Semaphore::new(self.worker.config.concurrency));
        let mut slots: Vec<Option<AssetOutcome>> = vec![None; urls.len()];
        let mut handles = Vec::with_capacity(urls.len());
        let mut was_interrupted = false;

        info!("starting batch");

        for (index, (url, planned)) in urls.iter().zip(plan).enumerate() {
            let job = AssetJob {
                index,
                url: url.as_ref().to_string(),
                local_path: dest_dir.join(&planned.file_name),
                planned,
            };

            if interrupted.load(Ordering::SeqCst) {
                was_interrupted = true;
                slots[index] = Some(job.cancelled());
                continue;
            }

            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|_| PipelineError::SemaphoreClosed)?;

            // The flag may have been set while waiting for a permit.
            if interrupted.load(Ordering::SeqCst) {
                was_interrupted = true;
                slots[index] = Some(job.cancelled());
                continue;
            }

            let worker = self.worker.clone();
            let fallback = job.clone();
            handles.push((
                fallback,
                tokio::spawn(async move {
                    let _permit = permit;
                    worker.process(job).await
                }),
            ));
        }

        debug!(task_count = handles.len(), "waiting for assets to complete");

        for (job, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(index = job.index, url = %job.url, error = %e, "asset task panicked");
                    job.into_outcome(
                        AssetStatus::FetchFailed {
                            failure: FailureType::Permanent,
                            kind: "task",
                            http_status: None,
                            reason: e.to_string(),
                        },
                        None,
                        0,
                    )
                }
            };
            let index = outcome.index;
            slots[index] = Some(outcome);
        }

        let report = BatchReport {
            outcomes: slots.into_iter().flatten().collect(),
            interrupted: was_interrupted,
        };
        log_summary(&report);
        Ok(report)
    }

    /// Inspects and upscales every supported image file already in `dir`.
    ///
    /// Files are processed in name order, `concurrency` at a time, with no
    /// network access. Failures are isolated per file.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ReadDir`] if `dir` cannot be listed.
    #[instrument(skip(self, dir), fields(dir = %dir.display()))]
    pub async fn normalize_directory(&self, dir: &Path) -> Result<BatchReport, PipelineError> {
        let files = self.supported_files(dir).await?;
        let floor = self.worker.config.min_dimension;
        debug!(count = files.len(), "normalizing directory");

        let outcomes: Vec<AssetOutcome> = stream::iter(files.into_iter().enumerate())
            .map(|(index, path)| async move {
                let (status, byte_size) = normalize_off_thread(path.clone(), floor).await;
                AssetOutcome {
                    index,
                    url: None,
                    file_name: display_name(&path),
                    local_path: path,
                    byte_size,
                    status,
                    attempts: 0,
                    collided_with: None,
                }
            })
            .buffered(self.worker.config.concurrency)
            .collect()
            .await;

        let report = BatchReport {
            outcomes,
            interrupted: false,
        };
        log_summary(&report);
        Ok(report)
    }

    async fn supported_files(&self, dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| PipelineError::read_dir(dir, e))?;
        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| PipelineError::read_dir(dir, e))?
        {
            let is_file = entry.file_type().await.is_ok_and(|t| t.is_file());
            let name = entry.file_name();
            if is_file && self.worker.config.is_supported_file(&name.to_string_lossy()) {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }
}

/// One planned asset.
#[derive(Debug, Clone)]
struct AssetJob {
    index: usize,
    url: String,
    local_path: PathBuf,
    planned: PlannedName,
}

impl AssetJob {
    fn into_outcome(self, status: AssetStatus, byte_size: Option<u64>, attempts: u32) -> AssetOutcome {
        AssetOutcome {
            index: self.index,
            url: Some(self.url),
            file_name: self.planned.file_name,
            local_path: self.local_path,
            byte_size,
            status,
            attempts,
            collided_with: self.planned.collided_with,
        }
    }

    fn cancelled(self) -> AssetOutcome {
        debug!(index = self.index, url = %self.url, "asset cancelled before start");
        self.into_outcome(AssetStatus::Cancelled, None, 0)
    }
}

impl AssetWorker {
    #[instrument(skip(self, job), fields(index = job.index, url = %job.url, file = %job.planned.file_name))]
    async fn process(&self, job: AssetJob) -> AssetOutcome {
        if let Some(original) = &job.planned.collided_with {
            info!(%original, "file name taken in this batch; using suffixed name");
        }

        debug!("fetching");
        let (asset, attempts) = match self.fetch_with_retry(&job.url, &job.local_path).await {
            Ok(fetched) => fetched,
            Err((e, attempts)) => {
                warn!(error = %e, attempts, "fetch failed");
                let status = AssetStatus::FetchFailed {
                    failure: classify_error(&e),
                    kind: e.kind(),
                    http_status: e.status(),
                    reason: e.to_string(),
                };
                return job.into_outcome(status, None, attempts);
            }
        };

        if !self.config.is_supported_file(&job.planned.file_name) {
            debug!("extension not inspected; keeping file as fetched");
            let status = AssetStatus::Done {
                dimensions: None,
                upscaled_from: None,
            };
            return job.into_outcome(status, Some(asset.byte_size), attempts);
        }

        debug!(bytes = asset.byte_size, "inspecting");
        let (status, byte_size) =
            normalize_off_thread(asset.local_path.clone(), self.config.min_dimension).await;
        job.into_outcome(status, byte_size.or(Some(asset.byte_size)), attempts)
    }

    /// Fetches with pacing and the retry policy.
    ///
    /// Returns the error and the number of attempts made when every attempt failed.
    async fn fetch_with_retry(
        &self,
        url: &str,
        destination: &Path,
    ) -> Result<(DownloadedAsset, u32), (DownloadError, u32)> {
        let mut attempt = 1u32;
        loop {
            self.rate_limiter.acquire(url).await;

            let error = match self.client.fetch(url, destination).await {
                Ok(asset) => return Ok((asset, attempt)),
                Err(e) => e,
            };

            if let Some(delay) = server_retry_after(&error) {
                self.rate_limiter.record_rate_limit(url, delay).await;
            }

            match self.retry_policy.decide(&error, attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next_attempt,
                } => {
                    info!(
                        attempt = next_attempt,
                        max_attempts = self.retry_policy.max_attempts(),
                        delay_ms = delay.as_millis(),
                        error = %error,
                        "retrying fetch"
                    );
                    tokio::time::sleep(delay).await;
                    attempt = next_attempt;
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(%reason, "not retrying fetch");
                    return Err((error, attempt));
                }
            }
        }
    }
}

/// Runs [`normalize_file`] on the blocking pool.
async fn normalize_off_thread(path: PathBuf, floor: u32) -> (AssetStatus, Option<u64>) {
    let task_path = path.clone();
    match tokio::task::spawn_blocking(move || normalize_file(&task_path, floor)).await {
        Ok(result) => result,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "inspection task panicked");
            let status = AssetStatus::InspectFailed {
                kind: "task",
                reason: e.to_string(),
            };
            (status, file_size(&path))
        }
    }
}

/// Inspect, then upscale when below `floor`.
fn normalize_file(path: &Path, floor: u32) -> (AssetStatus, Option<u64>) {
    let dimensions = match media::inspect(path) {
        Ok(dimensions) => dimensions,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "not a readable image; keeping file");
            let status = AssetStatus::InspectFailed {
                kind: e.kind(),
                reason: e.to_string(),
            };
            return (status, file_size(path));
        }
    };

    let status = match media::ensure_minimum_size(path, dimensions, floor) {
        Ok(after) => AssetStatus::Done {
            dimensions: Some(after),
            upscaled_from: (after != dimensions).then_some(dimensions),
        },
        Err(e) => {
            warn!(path = %path.display(), error = %e, "upscale failed; original kept");
            upscale_failed(dimensions, &e)
        }
    };
    (status, file_size(path))
}

fn upscale_failed(dimensions: Dimensions, error: &media::MediaError) -> AssetStatus {
    AssetStatus::UpscaleFailed {
        dimensions,
        kind: error.kind(),
        reason: error.to_string(),
    }
}

fn file_size(path: &Path) -> Option<u64> {
    std::fs::metadata(path).ok().map(|m| m.len())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

async fn create_dest_dir(dir: &Path) -> Result<(), PipelineError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| PipelineError::create_dir(dir, e))
}

fn log_summary(report: &BatchReport) {
    let summary = report.summary();
    info!(
        total = summary.total,
        done = summary.done,
        upscaled = summary.upscaled,
        fetch_failed = summary.fetch_failed,
        inspect_failed = summary.inspect_failed,
        upscale_failed = summary.upscale_failed,
        cancelled = summary.cancelled,
        collisions = summary.collisions,
        interrupted = report.interrupted,
        "batch complete"
    );
}
