//! Per-asset outcomes and the batch report built from them.

use std::path::PathBuf;

use serde::Serialize;

use crate::download::{DownloadedAsset, FailureType};
use crate::media::Dimensions;

/// Terminal state of one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AssetStatus {
    /// Fetched and, when its dimensions could be read, at or above the floor.
    ///
    /// `dimensions` is `None` for files whose extension is not inspected.
    Done {
        /// Final dimensions.
        dimensions: Option<Dimensions>,
        /// Dimensions before upscaling, when the file was rewritten.
        upscaled_from: Option<Dimensions>,
    },

    /// No usable file was fetched.
    FetchFailed {
        /// Retry classification of the last failure.
        failure: FailureType,
        /// Short error kind (`http_status`, `timeout`, ...).
        kind: &'static str,
        /// HTTP status, when the server answered.
        http_status: Option<u16>,
        /// Human-readable reason.
        reason: String,
    },

    /// The file was fetched but is not a readable image; it is kept as is.
    InspectFailed {
        /// Short error kind.
        kind: &'static str,
        /// Human-readable reason.
        reason: String,
    },

    /// The file is below the floor and could not be rewritten; the original is kept.
    UpscaleFailed {
        /// Dimensions of the kept original.
        dimensions: Dimensions,
        /// Short error kind.
        kind: &'static str,
        /// Human-readable reason.
        reason: String,
    },

    /// The run was interrupted before this asset started.
    Cancelled,
}

impl AssetStatus {
    /// Returns true for [`AssetStatus::Done`].
    #[must_use]
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }

    /// Returns true for the three failure states.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::FetchFailed { .. } | Self::InspectFailed { .. } | Self::UpscaleFailed { .. }
        )
    }

    /// Short label used in logs and summaries.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Done { .. } => "done",
            Self::FetchFailed { .. } => "fetch_failed",
            Self::InspectFailed { .. } => "inspect_failed",
            Self::UpscaleFailed { .. } => "upscale_failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// What happened to one asset of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetOutcome {
    /// Position in the input list.
    pub index: usize,
    /// Source URL; `None` for files found by directory normalization.
    pub url: Option<String>,
    /// Destination file name inside the batch directory.
    pub file_name: String,
    /// Full destination path.
    pub local_path: PathBuf,
    /// Size on disk after the last stage that touched the file.
    pub byte_size: Option<u64>,
    /// Terminal state.
    #[serde(flatten)]
    pub status: AssetStatus,
    /// Fetch attempts made (0 when nothing was fetched).
    pub attempts: u32,
    /// Name this asset would have had without collision suffixing.
    pub collided_with: Option<String>,
}

impl AssetOutcome {
    /// Returns the fetched asset when a file from this outcome is on disk.
    #[must_use]
    pub fn asset(&self) -> Option<DownloadedAsset> {
        let dimensions = match &self.status {
            AssetStatus::Done { dimensions, .. } => *dimensions,
            AssetStatus::InspectFailed { .. } => None,
            AssetStatus::UpscaleFailed { dimensions, .. } => Some(*dimensions),
            AssetStatus::FetchFailed { .. } | AssetStatus::Cancelled => return None,
        };
        Some(DownloadedAsset {
            source_url: self.url.clone().unwrap_or_default(),
            local_path: self.local_path.clone(),
            byte_size: self.byte_size.unwrap_or_default(),
            dimensions,
        })
    }
}

/// Ordered outcome log of one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// One entry per input, in input order.
    pub outcomes: Vec<AssetOutcome>,
    /// True when the run was asked to stop before every asset started.
    pub interrupted: bool,
}

impl BatchReport {
    /// Counts outcomes by kind.
    #[must_use]
    pub fn summary(&self) -> BatchSummary {
        let mut summary = BatchSummary {
            total: self.outcomes.len(),
            ..BatchSummary::default()
        };
        for outcome in &self.outcomes {
            match &outcome.status {
                AssetStatus::Done { upscaled_from, .. } => {
                    summary.done += 1;
                    if upscaled_from.is_some() {
                        summary.upscaled += 1;
                    }
                }
                AssetStatus::FetchFailed { .. } => summary.fetch_failed += 1,
                AssetStatus::InspectFailed { .. } => summary.inspect_failed += 1,
                AssetStatus::UpscaleFailed { .. } => summary.upscale_failed += 1,
                AssetStatus::Cancelled => summary.cancelled += 1,
            }
            if outcome.collided_with.is_some() {
                summary.collisions += 1;
            }
        }
        summary
    }

    /// Assets that have a file on disk.
    pub fn assets(&self) -> impl Iterator<Item = DownloadedAsset> + '_ {
        self.outcomes.iter().filter_map(AssetOutcome::asset)
    }
}

/// Outcome counts of a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    /// Number of inputs.
    pub total: usize,
    /// Assets that reached [`AssetStatus::Done`].
    pub done: usize,
    /// Of `done`, how many were rewritten.
    pub upscaled: usize,
    /// Fetch failures.
    pub fetch_failed: usize,
    /// Inspection failures.
    pub inspect_failed: usize,
    /// Upscale failures.
    pub upscale_failed: usize,
    /// Assets never started.
    pub cancelled: usize,
    /// Assets whose file name was suffixed to avoid a collision.
    pub collisions: usize,
}

impl BatchSummary {
    /// Total of all failure kinds.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.fetch_failed + self.inspect_failed + self.upscale_failed
    }

    /// Returns true when every asset reached `Done` (vacuously true for an empty batch).
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.done == self.total
    }
}
