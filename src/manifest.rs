//! The newline-delimited URL list (`images.txt`) that sits between
//! extraction and fetching.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, instrument};

/// File name of the URL list inside a harvest directory.
pub const MANIFEST_FILE_NAME: &str = "images.txt";

/// Errors reading or writing the URL list.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The list could not be read.
    #[error("cannot read URL list {path}: {source}")]
    Read {
        /// Path of the list.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The list could not be written or moved into place.
    #[error("cannot write URL list {path}: {source}")]
    Write {
        /// Path of the list.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Reads URLs from `path`, one per line.
///
/// Surrounding whitespace is trimmed; blank lines and lines starting with `#`
/// are skipped; repeated URLs keep only their first occurrence.
///
/// # Errors
///
/// Returns [`ManifestError::Read`] if the file cannot be read.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub fn read_manifest(path: &Path) -> Result<Vec<String>, ManifestError> {
    let raw = fs::read_to_string(path).map_err(|source| ManifestError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let urls = parse_manifest(&raw);
    debug!(count = urls.len(), "read URL list");
    Ok(urls)
}

fn parse_manifest(raw: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter(|line| seen.insert(*line))
        .map(ToString::to_string)
        .collect()
}

/// Writes `urls` to `path`, one per line, replacing any previous list.
///
/// The list is written to a sibling temporary file first and renamed into
/// place, so readers never observe a partial list.
///
/// # Errors
///
/// Returns [`ManifestError::Write`] if the file cannot be written or renamed.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub fn write_manifest<I, S>(path: &Path, urls: I) -> Result<usize, ManifestError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let write_err = |source| ManifestError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut body = String::new();
    let mut count = 0usize;
    for url in urls {
        body.push_str(url.as_ref());
        body.push('\n');
        count += 1;
    }

    let temp = crate::media::temp_sibling(path);
    let result = fs::File::create(&temp)
        .and_then(|mut file| {
            file.write_all(body.as_bytes())?;
            file.sync_all()
        })
        .and_then(|()| fs::rename(&temp, path));
    if let Err(e) = result {
        let _ = fs::remove_file(&temp);
        return Err(write_err(e));
    }

    debug!(count, "wrote URL list");
    Ok(count)
}
