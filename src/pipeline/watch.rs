//! Long-running directory watch: upscale images as they land in a folder.
//!
//! The directory is polled rather than subscribed to. A file is handed to
//! the normalizer once its size and modification time have stopped changing
//! for [`WatchOptions::settle`], so half-written downloads are never decoded.
//! Files already present at startup are treated as new.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use futures_util::StreamExt;
use futures_util::stream;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::{
    AssetOutcome, BatchReport, Pipeline, PipelineError, display_name, log_summary,
    normalize_off_thread,
};

/// Default delay between directory scans.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default time a file must stay unchanged before it is processed.
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(2);

/// Timing of a directory watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    /// Delay between directory scans.
    pub poll_interval: Duration,
    /// How long size and mtime must be stable before a file is processed.
    pub settle: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            settle: DEFAULT_SETTLE,
        }
    }
}

/// Size and modification time; a change in either means the file was rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Signature {
    len: u64,
    modified: Option<SystemTime>,
}

#[derive(Debug)]
struct Tracked {
    signature: Signature,
    stable_since: Instant,
    handled: Option<Signature>,
}

/// Returns true for names the watcher never touches: dotfiles and the
/// staging siblings of in-progress fetches and upscales.
#[must_use]
pub fn is_ignored_name(file_name: &str) -> bool {
    file_name.starts_with('.')
        || file_name.ends_with(crate::download::constants::PARTIAL_SUFFIX)
        || file_name.ends_with(crate::media::TEMP_SUFFIX)
}

impl Pipeline {
    /// Watches `dir` and normalizes each supported image once it is written,
    /// until `interrupted` is set.
    ///
    /// New files and rewritten files are both processed. The pipeline's own
    /// replacement of an upscaled file is not picked up again. Per-file
    /// failures are logged and recorded; they never stop the watch.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ReadDir`] if `dir` cannot be listed at startup.
    #[instrument(skip(self, dir, interrupted), fields(dir = %dir.display()))]
    pub async fn watch_directory(
        &self,
        dir: &Path,
        options: WatchOptions,
        interrupted: Arc<AtomicBool>,
    ) -> Result<BatchReport, PipelineError> {
        let floor = self.worker.config.min_dimension;
        let concurrency = self.worker.config.concurrency;
        let mut tracked: HashMap<PathBuf, Tracked> = HashMap::new();
        let mut outcomes: Vec<AssetOutcome> = Vec::new();

        // Fail fast on a missing directory; later listing errors are transient.
        self.supported_files(dir).await?;
        info!(
            settle_ms = options.settle.as_millis(),
            min_dimension = floor,
            "watching directory"
        );

        while !interrupted.load(Ordering::SeqCst) {
            let files = match self.supported_files(dir).await {
                Ok(files) => files,
                Err(e) => {
                    warn!(error = %e, "could not list watched directory");
                    tokio::time::sleep(options.poll_interval).await;
                    continue;
                }
            };

            let now = Instant::now();
            let ready = collect_ready(&mut tracked, files, now, options.settle).await;

            let start = outcomes.len();
            let processed: Vec<AssetOutcome> = stream::iter(ready.into_iter().enumerate())
                .map(|(offset, path)| async move {
                    info!(file = %display_name(&path), "processing watched file");
                    let (status, byte_size) = normalize_off_thread(path.clone(), floor).await;
                    AssetOutcome {
                        index: start + offset,
                        url: None,
                        file_name: display_name(&path),
                        local_path: path,
                        byte_size,
                        status,
                        attempts: 0,
                        collided_with: None,
                    }
                })
                .buffered(concurrency)
                .collect()
                .await;

            for outcome in processed {
                if let Some(signature) = signature_of(&outcome.local_path).await
                    && let Some(entry) = tracked.get_mut(&outcome.local_path)
                {
                    entry.signature = signature;
                    entry.handled = Some(signature);
                }
                debug!(
                    file = %outcome.file_name,
                    status = outcome.status.label(),
                    "watched file done"
                );
                outcomes.push(outcome);
            }

            tokio::time::sleep(options.poll_interval).await;
        }

        info!("stopping directory watch");
        let report = BatchReport {
            outcomes,
            interrupted: false,
        };
        log_summary(&report);
        Ok(report)
    }
}

/// Updates `tracked` from the current listing and returns files that have
/// been stable for `settle` and not yet handled in their current form.
async fn collect_ready(
    tracked: &mut HashMap<PathBuf, Tracked>,
    files: Vec<PathBuf>,
    now: Instant,
    settle: Duration,
) -> Vec<PathBuf> {
    let mut ready = Vec::new();
    let mut present = Vec::with_capacity(files.len());

    for path in files {
        if is_ignored_name(&display_name(&path)) {
            continue;
        }
        let Some(signature) = signature_of(&path).await else {
            continue;
        };
        present.push(path.clone());

        let entry = tracked.entry(path.clone()).or_insert_with(|| Tracked {
            signature,
            stable_since: now,
            handled: None,
        });
        if entry.signature != signature {
            entry.signature = signature;
            entry.stable_since = now;
        }
        if entry.handled != Some(signature) && now.duration_since(entry.stable_since) >= settle {
            ready.push(path);
        }
    }

    tracked.retain(|path, _| {
        let keep = present.contains(path);
        if !keep {
            debug!(file = %display_name(path), "watched file removed");
        }
        keep
    });
    ready
}

async fn signature_of(path: &Path) -> Option<Signature> {
    let metadata = tokio::fs::metadata(path).await.ok()?;
    Some(Signature {
        len: metadata.len(),
        modified: metadata.modified().ok(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Cursor;

    use image::{DynamicImage, ImageFormat, RgbImage};
    use tempfile::TempDir;

    use super::*;
    use crate::config::PipelineConfig;
    use crate::media::{self, Dimensions};
    use crate::pipeline::AssetStatus;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::new(width, height))
            .write_to(&mut buffer, ImageFormat::Png)
            .unwrap();
        buffer.into_inner()
    }

    fn fast_options() -> WatchOptions {
        WatchOptions {
            poll_interval: Duration::from_millis(20),
            settle: Duration::from_millis(100),
        }
    }

    fn pipeline(min_dimension: u32) -> Pipeline {
        Pipeline::new(PipelineConfig {
            min_dimension,
            pacing: Duration::ZERO,
            ..PipelineConfig::default()
        })
        .unwrap()
    }

    async fn wait_for_dimensions(path: &Path, expected: Dimensions) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if media::inspect(path).ok() == Some(expected) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("{} never reached {expected}", path.display());
    }

    #[test]
    fn test_is_ignored_name() {
        assert!(is_ignored_name(".hidden.png"));
        assert!(is_ignored_name("a.png.part"));
        assert!(is_ignored_name("a.png.tmp"));
        assert!(!is_ignored_name("a.png"));
    }

    #[tokio::test]
    async fn test_watch_upscales_dropped_image() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("existing.png"), png_bytes(10, 20)).unwrap();
        let interrupted = Arc::new(AtomicBool::new(false));
        let watch_dir = dir.path().to_path_buf();
        let flag = Arc::clone(&interrupted);
        let handle = tokio::spawn(async move {
            pipeline(40)
                .watch_directory(&watch_dir, fast_options(), flag)
                .await
        });

        wait_for_dimensions(&dir.path().join("existing.png"), Dimensions::new(40, 80)).await;
        std::fs::write(dir.path().join("dropped.png"), png_bytes(20, 10)).unwrap();
        std::fs::write(dir.path().join(".hidden.png"), png_bytes(5, 5)).unwrap();
        std::fs::write(dir.path().join("fetching.png.part"), png_bytes(5, 5)).unwrap();
        wait_for_dimensions(&dir.path().join("dropped.png"), Dimensions::new(80, 40)).await;
        // Give the watcher a few more scans to (wrongly) revisit its own output.
        tokio::time::sleep(Duration::from_millis(300)).await;

        interrupted.store(true, Ordering::SeqCst);
        let report = handle.await.unwrap().unwrap();

        let names: Vec<&str> = report.outcomes.iter().map(|o| o.file_name.as_str()).collect();
        assert_eq!(names, ["existing.png", "dropped.png"]);
        assert_eq!(
            report.outcomes[1].status,
            AssetStatus::Done {
                dimensions: Some(Dimensions::new(80, 40)),
                upscaled_from: Some(Dimensions::new(20, 10)),
            }
        );
        assert_eq!(
            media::inspect(&dir.path().join(".hidden.png")).unwrap(),
            Dimensions::new(5, 5)
        );
    }

    #[tokio::test]
    async fn test_watch_reprocesses_rewritten_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.png");
        std::fs::write(&path, png_bytes(10, 10)).unwrap();
        let interrupted = Arc::new(AtomicBool::new(false));
        let watch_dir = dir.path().to_path_buf();
        let flag = Arc::clone(&interrupted);
        let handle = tokio::spawn(async move {
            pipeline(30)
                .watch_directory(&watch_dir, fast_options(), flag)
                .await
        });

        wait_for_dimensions(&path, Dimensions::new(30, 30)).await;
        std::fs::write(&path, png_bytes(15, 5)).unwrap();
        wait_for_dimensions(&path, Dimensions::new(90, 30)).await;

        interrupted.store(true, Ordering::SeqCst);
        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.outcomes.len(), 2);
        assert!(report.outcomes.iter().all(|o| o.status.is_done()));
    }

    #[tokio::test]
    async fn test_watch_missing_directory_is_fatal() {
        let dir = TempDir::new().unwrap();
        let err = pipeline(10)
            .watch_directory(
                &dir.path().join("absent"),
                fast_options(),
                Arc::new(AtomicBool::new(false)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ReadDir { .. }));
    }

    #[tokio::test]
    async fn test_watch_stops_when_already_interrupted() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.png"), png_bytes(5, 5)).unwrap();

        let report = pipeline(10)
            .watch_directory(dir.path(), fast_options(), Arc::new(AtomicBool::new(true)))
            .await
            .unwrap();

        assert!(report.outcomes.is_empty());
    }
}
