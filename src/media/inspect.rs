//! Pixel dimension lookup from image container headers.

use std::fmt;
use std::path::Path;

use image::ImageReader;
use serde::Serialize;
use tracing::{instrument, trace};

use super::MediaError;

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Creates a dimension pair.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns true when both sides are at least `floor`.
    #[must_use]
    pub const fn meets_floor(self, floor: u32) -> bool {
        self.width >= floor && self.height >= floor
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Reads the pixel dimensions of the image at `path`.
///
/// Only the container header is parsed; pixel data is not decoded. The
/// format is sniffed from the file's leading bytes, falling back to the
/// extension.
///
/// # Errors
///
/// - [`MediaError::Io`] when the file cannot be opened or read
/// - [`MediaError::Decode`] when the content is not a recognized image
///   or its header is truncated
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub fn inspect(path: &Path) -> Result<Dimensions, MediaError> {
    let reader = ImageReader::open(path)
        .map_err(|e| MediaError::io(path, e))?
        .with_guessed_format()
        .map_err(|e| MediaError::io(path, e))?;
    let format = reader.format();
    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| MediaError::decode(path, e))?;

    trace!(?format, width, height, "read image header");
    Ok(Dimensions { width, height })
}
