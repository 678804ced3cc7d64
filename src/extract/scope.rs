//! Narrowing of the scan region to the most likely content block.

use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use super::scan::{StartTag, comment_spans, in_comment, start_tags};

/// Which rule selected the scan region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "hint")]
pub enum ScopeKind {
    /// The first `<article>` element.
    Article,
    /// The first element whose class contains the given content hint.
    ContentContainer(String),
    /// Nothing matched; the whole document is scanned.
    WholeDocument,
}

/// A region of the document selected for scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope<'a> {
    /// Rule that selected the region.
    pub kind: ScopeKind,
    /// Inner markup of the region.
    pub html: &'a str,
}

/// Picks the region of `html` most likely to hold the page's content images.
///
/// Tries the first `<article>` element, then the first element (in document
/// order) whose `class` contains any of `content_hints`, then falls back to
/// the whole document. An element with no matching close tag extends to the
/// end of the document. Markup inside comments is never selected.
#[must_use]
pub fn narrow_scope<'a, S: AsRef<str>>(html: &'a str, content_hints: &[S]) -> Scope<'a> {
    if let Some(tag) = start_tags(html).find(|tag| tag.name == "article") {
        debug!(offset = tag.start, "scoping extraction to <article>");
        return Scope {
            kind: ScopeKind::Article,
            html: element_inner(html, &tag),
        };
    }

    let hinted = start_tags(html).find_map(|tag| {
        let class = tag.attribute("class")?;
        let hint = content_hints
            .iter()
            .map(AsRef::as_ref)
            .find(|hint| !hint.is_empty() && class.contains(hint))?;
        Some((hint.to_string(), tag))
    });
    if let Some((hint, tag)) = hinted {
        debug!(%hint, element = %tag.name, "scoping extraction to content container");
        return Scope {
            kind: ScopeKind::ContentContainer(hint),
            html: element_inner(html, &tag),
        };
    }

    debug!("no content region found; scanning whole document");
    Scope {
        kind: ScopeKind::WholeDocument,
        html,
    }
}

/// Returns the markup between `tag` and its matching close tag.
fn element_inner<'a>(html: &'a str, tag: &StartTag) -> &'a str {
    let body = &html[tag.end..];
    if tag.is_self_closing(html) {
        return "";
    }

    let pattern = format!(r"(?i)<(/?){}\b[^>]*>", regex::escape(&tag.name));
    let boundary = match Regex::new(&pattern) {
        Ok(regex) => regex,
        Err(e) => {
            warn!(element = %tag.name, error = %e, "could not build element boundary pattern");
            return body;
        }
    };

    let comments = comment_spans(body);
    let mut depth = 0usize;
    for found in boundary.captures_iter(body) {
        let (Some(whole), Some(slash)) = (found.get(0), found.get(1)) else {
            continue;
        };
        if in_comment(&comments, whole.start()) {
            continue;
        }
        if slash.as_str().is_empty() {
            if !whole.as_str().trim_end_matches('>').ends_with('/') {
                depth += 1;
            }
        } else if depth == 0 {
            return &body[..whole.start()];
        } else {
            depth -= 1;
        }
    }

    body
}
