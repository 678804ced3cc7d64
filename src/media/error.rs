//! Error types for image inspection and rewriting.

use std::path::PathBuf;

use thiserror::Error;

use super::Dimensions;

/// Errors raised while reading or rewriting an image on disk.
#[derive(Debug, Error)]
pub enum MediaError {
    /// The file is not a recognized image, or it is truncated or corrupt.
    #[error("cannot decode image {path}: {source}")]
    Decode {
        /// The file that failed to decode.
        path: PathBuf,
        /// The underlying decoder error.
        #[source]
        source: image::ImageError,
    },

    /// The container format could not be determined from content or extension.
    #[error("unrecognized image format for {path}")]
    UnknownFormat {
        /// The file whose format is unknown.
        path: PathBuf,
    },

    /// Encoding or writing the resized replacement failed.
    #[error("cannot write resized image for {path}: {source}")]
    Write {
        /// The image being replaced.
        path: PathBuf,
        /// The underlying encoder error.
        #[source]
        source: image::ImageError,
    },

    /// File system error while opening or replacing the image.
    #[error("IO error on {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The upscaled image would exceed the pixel budget.
    #[error("upscaling {path} to {target} exceeds the {max_pixels}-pixel limit")]
    TooLarge {
        /// The image that was left as it is.
        path: PathBuf,
        /// Size the floor would require.
        target: Dimensions,
        /// Largest pixel count an upscale may produce.
        max_pixels: u64,
    },

    /// Aspect ratio is undefined for an image with a zero-length side.
    #[error("image has a zero dimension ({width}x{height})")]
    ZeroDimension {
        /// Reported width.
        width: u32,
        /// Reported height.
        height: u32,
    },
}

impl MediaError {
    /// Creates a decode error.
    pub fn decode(path: impl Into<PathBuf>, source: image::ImageError) -> Self {
        Self::Decode {
            path: path.into(),
            source,
        }
    }

    /// Creates a write error.
    pub fn write(path: impl Into<PathBuf>, source: image::ImageError) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Short machine-readable label used in outcome reports.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode { .. } | Self::UnknownFormat { .. } | Self::ZeroDimension { .. } => {
                "decode"
            }
            Self::Write { .. } => "write",
            Self::TooLarge { .. } => "too_large",
            Self::Io { .. } => "io",
        }
    }
}
