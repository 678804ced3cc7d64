//! Destination file naming for fetched assets.
//!
//! Names come from the URL's last path segment. Segments that are missing,
//! too short, or lack an extension get a positional placeholder
//! (`image_<n>.jpg`). Names are planned for a whole batch up front so two
//! URLs never race for the same path.

use std::collections::HashSet;
use std::path::{Component, Path};

use serde::Serialize;
use tracing::debug;
use url::Url;

use super::constants::{MIN_SEGMENT_NAME_LEN, PLACEHOLDER_EXTENSION};

/// A destination name chosen for one URL of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedName {
    /// File name inside the destination directory.
    pub file_name: String,
    /// Name the URL would have received had it not been taken earlier in the batch.
    pub collided_with: Option<String>,
}

/// Derives the preferred file name for the URL at `index` (zero-based) in a batch.
#[must_use]
pub fn name_from_url(url: &str, index: usize) -> String {
    segment_name(url).unwrap_or_else(|| placeholder_name(index))
}

/// Positional fallback name, numbered from 1.
#[must_use]
pub fn placeholder_name(index: usize) -> String {
    format!("image_{}{PLACEHOLDER_EXTENSION}", index + 1)
}

fn segment_name(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    let decoded = urlencoding::decode(last).unwrap_or_else(|e| {
        debug!(segment = %last, error = %e, "URL decoding failed, using raw segment");
        last.into()
    });
    let name = sanitize_filename(&decoded);
    let usable = name.chars().count() >= MIN_SEGMENT_NAME_LEN
        && name.contains('.')
        && !name.trim_matches(|c| c == '.' || c == '_').is_empty();
    usable.then_some(name)
}

/// Plans unique destination names for `urls`, in order.
///
/// A name already used earlier in the batch (or listed in `reserved`) gets a
/// `_2`, `_3`, ... suffix before its extension. Comparison ignores ASCII case
/// so the plan is also safe on case-insensitive file systems.
#[must_use]
pub fn plan_file_names<S: AsRef<str>>(urls: &[S], reserved: &[&str]) -> Vec<PlannedName> {
    let mut taken: HashSet<String> = reserved.iter().map(|r| r.to_ascii_lowercase()).collect();

    urls.iter()
        .enumerate()
        .map(|(index, url)| {
            let preferred = name_from_url(url.as_ref(), index);
            if taken.insert(preferred.to_ascii_lowercase()) {
                return PlannedName {
                    file_name: preferred,
                    collided_with: None,
                };
            }

            let (stem, ext) = split_extension(&preferred);
            let file_name = (2..)
                .map(|i| format!("{stem}_{i}{ext}"))
                .find(|candidate| taken.insert(candidate.to_ascii_lowercase()))
                .unwrap_or_else(|| placeholder_name(index));
            debug!(url = %url.as_ref(), preferred = %preferred, assigned = %file_name, "name collision");
            PlannedName {
                file_name,
                collided_with: Some(preferred),
            }
        })
        .collect()
}

/// Splits `name` into stem and extension (extension keeps its dot).
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(pos) if pos > 0 => (&name[..pos], &name[pos..]),
        _ => (name, ""),
    }
}

/// Sanitizes filename for filesystem safety.
///
/// Replaces characters that are invalid on common filesystems:
/// / \ : * ? " < > |
pub(crate) fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() {
        return "_".to_string();
    }

    if is_safe_filename_segment(&sanitized) {
        sanitized
    } else {
        sanitized
            .chars()
            .map(|c| if c == '.' { '_' } else { c })
            .collect()
    }
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}
