//! Aspect-preserving upscaling to a minimum size, with atomic replacement.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use image::ImageReader;
use image::imageops::FilterType;
use tracing::{debug, info, instrument, warn};

use super::{Dimensions, MediaError};

/// Suffix of the sibling file a resized image is written to before it replaces the original.
pub const TEMP_SUFFIX: &str = ".tmp";

/// Largest image, in pixels, an upscale may produce. Strip-shaped sources
/// such as 1200x3 dividers would otherwise need gigabytes to resample.
pub const MAX_TARGET_PIXELS: u64 = 40_000_000;

/// Computes the smallest size with both sides at least `floor` that keeps
/// `current`'s aspect ratio.
///
/// The longer side is scaled first; whichever side is still short after
/// rounding is then pinned to `floor` and the other side recomputed from it.
/// Images already at or above the floor come back unchanged.
///
/// # Errors
///
/// Returns [`MediaError::ZeroDimension`] when either side is zero.
///
/// # Examples
///
/// ```
/// use harvester_core::media::{Dimensions, target_dimensions};
///
/// let target = target_dimensions(Dimensions::new(400, 300), 700).unwrap();
/// assert_eq!(target, Dimensions::new(933, 700));
/// ```
pub fn target_dimensions(current: Dimensions, floor: u32) -> Result<Dimensions, MediaError> {
    let Dimensions { width, height } = current;
    if width == 0 || height == 0 {
        return Err(MediaError::ZeroDimension { width, height });
    }
    if current.meets_floor(floor) {
        return Ok(current);
    }

    let (mut new_width, mut new_height) = if width < height {
        let h = height.max(floor);
        (scale(width, h, height), h)
    } else {
        let w = width.max(floor);
        (w, scale(height, w, width))
    };

    if new_width < floor {
        new_width = floor;
        new_height = scale(height, new_width, width);
    }
    if new_height < floor {
        new_height = floor;
        new_width = scale(width, new_height, height);
    }

    Ok(Dimensions::new(new_width, new_height))
}

/// `round(value * numerator / denominator)` in integer arithmetic, saturating at `u32::MAX`.
fn scale(value: u32, numerator: u32, denominator: u32) -> u32 {
    let (value, numerator, denominator) = (
        u128::from(value),
        u128::from(numerator),
        u128::from(denominator),
    );
    let rounded = (2 * value * numerator + denominator) / (2 * denominator);
    u32::try_from(rounded).unwrap_or(u32::MAX)
}

/// Upscales the image at `path` in place when it is smaller than `floor`.
///
/// Returns the dimensions the file has afterwards. When `current` already
/// meets the floor nothing is read or written. Otherwise the image is
/// decoded, resampled with Lanczos3 to the exact target size, encoded in its
/// original format to `<path>.tmp`, and renamed over `path`. Readers of
/// `path` see either the old file or the complete new one.
///
/// # Errors
///
/// On any failure the original file is left untouched and the temporary
/// sibling is removed:
/// - [`MediaError::Decode`] / [`MediaError::UnknownFormat`] for unreadable sources
/// - [`MediaError::TooLarge`] when the target exceeds [`MAX_TARGET_PIXELS`]
/// - [`MediaError::Write`] when encoding the replacement fails
/// - [`MediaError::Io`] when the replacement cannot be moved into place
#[instrument(level = "debug", skip_all, fields(path = %path.display(), current = %current, floor))]
pub fn ensure_minimum_size(
    path: &Path,
    current: Dimensions,
    floor: u32,
) -> Result<Dimensions, MediaError> {
    let target = target_dimensions(current, floor)?;
    if target == current {
        debug!("image meets floor; leaving untouched");
        return Ok(current);
    }
    if u64::from(target.width) * u64::from(target.height) > MAX_TARGET_PIXELS {
        return Err(MediaError::TooLarge {
            path: path.to_path_buf(),
            target,
            max_pixels: MAX_TARGET_PIXELS,
        });
    }

    let reader = ImageReader::open(path)
        .map_err(|e| MediaError::io(path, e))?
        .with_guessed_format()
        .map_err(|e| MediaError::io(path, e))?;
    let format = reader
        .format()
        .ok_or_else(|| MediaError::UnknownFormat {
            path: path.to_path_buf(),
        })?;
    let image = reader.decode().map_err(|e| MediaError::decode(path, e))?;

    let resized = image.resize_exact(target.width, target.height, FilterType::Lanczos3);

    let temp = temp_sibling(path);
    if let Err(e) = resized.save_with_format(&temp, format) {
        discard_temp(&temp);
        return Err(MediaError::write(path, e));
    }
    if let Err(e) = fs::rename(&temp, path) {
        discard_temp(&temp);
        return Err(MediaError::io(path, e));
    }

    info!(from = %current, to = %target, "upscaled image");
    Ok(target)
}

/// `<path>.tmp`, next to the original so the final rename stays on one file system.
#[must_use]
pub fn temp_sibling(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

fn discard_temp(temp: &Path) {
    if let Err(e) = fs::remove_file(temp)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %temp.display(), error = %e, "could not remove temporary file");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::media::inspect;
    use image::{ImageFormat, Rgb, RgbImage};
    use tempfile::TempDir;

    fn write_image(dir: &Path, name: &str, width: u32, height: u32, format: ImageFormat) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]))
            .save_with_format(&path, format)
            .unwrap();
        path
    }

    #[test]
    fn test_target_dimensions_landscape_rescales_short_side() {
        // The first pass by width gives 700x525; the height is still short,
        // so it is pinned to the floor and the width recomputed.
        let target = target_dimensions(Dimensions::new(400, 300), 700).unwrap();
        assert_ne!(target, Dimensions::new(700, 300));
        assert_ne!(target, Dimensions::new(700, 525));
        assert_eq!(target, Dimensions::new(933, 700));
    }

    #[test]
    fn test_target_dimensions_portrait_and_square() {
        assert_eq!(
            target_dimensions(Dimensions::new(300, 400), 700).unwrap(),
            Dimensions::new(700, 933)
        );
        assert_eq!(
            target_dimensions(Dimensions::new(50, 50), 700).unwrap(),
            Dimensions::new(700, 700)
        );
    }

    #[test]
    fn test_target_dimensions_one_side_already_large() {
        assert_eq!(
            target_dimensions(Dimensions::new(2000, 300), 700).unwrap(),
            Dimensions::new(4667, 700)
        );
        assert_eq!(
            target_dimensions(Dimensions::new(700, 699), 700).unwrap(),
            Dimensions::new(701, 700)
        );
    }

    #[test]
    fn test_target_dimensions_noop_at_or_above_floor() {
        for dims in [Dimensions::new(700, 700), Dimensions::new(1920, 1080)] {
            assert_eq!(target_dimensions(dims, 700).unwrap(), dims);
        }
    }

    #[test]
    fn test_target_dimensions_zero_side_is_error() {
        assert!(matches!(
            target_dimensions(Dimensions::new(0, 10), 700),
            Err(MediaError::ZeroDimension { .. })
        ));
    }

    #[test]
    fn test_target_dimensions_preserves_aspect_ratio_grid() {
        let sides = [1u32, 2, 3, 7, 50, 299, 400, 525, 699, 700, 701, 1500, 4000];
        for &w in &sides {
            for &h in &sides {
                let floor = 700;
                let original = Dimensions::new(w, h);
                let t = target_dimensions(original, floor).unwrap();
                if original.meets_floor(floor) {
                    assert_eq!(t, original);
                    continue;
                }
                assert!(t.meets_floor(floor), "{original} -> {t} is below floor");

                let exact_w = f64::from(w) * f64::from(t.height) / f64::from(h);
                let exact_h = f64::from(h) * f64::from(t.width) / f64::from(w);
                let within_pixel = (f64::from(t.width) - exact_w).abs() <= 1.0
                    || (f64::from(t.height) - exact_h).abs() <= 1.0;
                assert!(within_pixel, "{original} -> {t} distorts aspect ratio");
            }
        }
    }

    #[test]
    fn test_scale_rounds_half_up() {
        assert_eq!(scale(400, 700, 300), 933);
        assert_eq!(scale(1, 1, 2), 1);
        assert_eq!(scale(u32::MAX, u32::MAX, 1), u32::MAX);
    }

    #[test]
    fn test_ensure_minimum_size_upscales_in_place() {
        let dir = TempDir::new().unwrap();
        let path = write_image(dir.path(), "small.png", 40, 30, ImageFormat::Png);

        let result = ensure_minimum_size(&path, Dimensions::new(40, 30), 70).unwrap();

        assert_eq!(result, Dimensions::new(93, 70));
        assert_eq!(inspect(&path).unwrap(), Dimensions::new(93, 70));
        assert!(!temp_sibling(&path).exists());
        let format = ImageReader::open(&path)
            .unwrap()
            .with_guessed_format()
            .unwrap()
            .format();
        assert_eq!(format, Some(ImageFormat::Png));
    }

    #[test]
    fn test_ensure_minimum_size_keeps_jpeg_format() {
        let dir = TempDir::new().unwrap();
        let path = write_image(dir.path(), "small.jpg", 20, 40, ImageFormat::Jpeg);

        let result = ensure_minimum_size(&path, Dimensions::new(20, 40), 50).unwrap();

        assert_eq!(result, Dimensions::new(50, 100));
        let reader = ImageReader::open(&path).unwrap().with_guessed_format().unwrap();
        assert_eq!(reader.format(), Some(ImageFormat::Jpeg));
        assert_eq!(reader.into_dimensions().unwrap(), (50, 100));
    }

    #[test]
    fn test_ensure_minimum_size_noop_leaves_bytes_identical() {
        let dir = TempDir::new().unwrap();
        let path = write_image(dir.path(), "big.png", 80, 80, ImageFormat::Png);
        let before = fs::read(&path).unwrap();

        let result = ensure_minimum_size(&path, Dimensions::new(80, 80), 70).unwrap();

        assert_eq!(result, Dimensions::new(80, 80));
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn test_ensure_minimum_size_write_failure_keeps_original() {
        let dir = TempDir::new().unwrap();
        let path = write_image(dir.path(), "small.png", 40, 30, ImageFormat::Png);
        let before = fs::read(&path).unwrap();
        // A directory squatting on the temp path makes the encoder's create fail.
        fs::create_dir(temp_sibling(&path)).unwrap();

        let err = ensure_minimum_size(&path, Dimensions::new(40, 30), 70).unwrap_err();

        assert!(matches!(err, MediaError::Write { .. }), "got {err:?}");
        assert_eq!(fs::read(&path).unwrap(), before);
        assert_eq!(inspect(&path).unwrap(), Dimensions::new(40, 30));
    }

    #[test]
    fn test_ensure_minimum_size_corrupt_source_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.png");
        fs::write(&path, b"\x89PNG\r\n\x1a\nthis is not really a png").unwrap();

        let err = ensure_minimum_size(&path, Dimensions::new(10, 10), 70).unwrap_err();

        assert!(matches!(err, MediaError::Decode { .. }), "got {err:?}");
        assert_eq!(
            fs::read(&path).unwrap(),
            b"\x89PNG\r\n\x1a\nthis is not really a png"
        );
        assert!(!temp_sibling(&path).exists());
    }

    #[test]
    fn test_ensure_minimum_size_refuses_oversized_target() {
        let dir = TempDir::new().unwrap();
        let path = write_image(dir.path(), "divider.png", 1200, 3, ImageFormat::Png);
        let before = fs::read(&path).unwrap();

        let err = ensure_minimum_size(&path, Dimensions::new(1200, 3), 700).unwrap_err();

        assert!(
            matches!(
                err,
                MediaError::TooLarge { target, .. } if target == Dimensions::new(280_000, 700)
            ),
            "got {err:?}"
        );
        assert_eq!(err.kind(), "too_large");
        assert_eq!(fs::read(&path).unwrap(), before);
        assert!(!temp_sibling(&path).exists());
    }

    #[test]
    fn test_temp_sibling_appends_suffix() {
        assert_eq!(
            temp_sibling(Path::new("/x/a.jpg")),
            PathBuf::from("/x/a.jpg.tmp")
        );
    }
}
