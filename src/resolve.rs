//! Resolution of raw markup references into absolute, fetchable URLs.
//!
//! A reference that already carries a scheme is kept verbatim once it parses;
//! anything else is joined onto the document base with standard relative-URL
//! rules (protocol-relative, root-relative and path-relative forms).

use std::fmt;

use serde::Serialize;
use thiserror::Error;
use tracing::trace;
use url::Url;

/// Maximum reference length to accept (standard browser limit).
pub const MAX_URL_LENGTH: usize = 2000;

/// Why a raw reference was filtered out instead of resolved.
///
/// These are not failures: markup is full of placeholders, inline payloads
/// and anchors that simply have no fetchable image behind them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// Reference was empty after trimming.
    #[error("empty reference")]
    Empty,

    /// Inline `data:` payload.
    #[error("inline data reference")]
    InlineData,

    /// Bare `#fragment` anchor.
    #[error("fragment-only reference '{reference}'")]
    FragmentOnly {
        /// The rejected reference.
        reference: String,
    },

    /// Scheme other than http/https (`javascript:`, `blob:`, `mailto:` ...).
    #[error("unsupported scheme '{scheme}' in '{reference}'")]
    UnsupportedScheme {
        /// The rejected reference.
        reference: String,
        /// The scheme that was found.
        scheme: String,
    },

    /// Result could not be parsed as a URL.
    #[error("malformed reference '{reference}': {reason}")]
    Malformed {
        /// The rejected reference.
        reference: String,
        /// Parser error text.
        reason: String,
    },

    /// Result parsed but has no host component.
    #[error("reference '{reference}' has no host")]
    NoHost {
        /// The rejected reference.
        reference: String,
    },
}

/// An absolute http(s) URL with a host, derived from a markup reference.
///
/// Equality is exact string equality, which is what batch deduplication uses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ResolvedUrl(String);

impl ResolvedUrl {
    /// Returns the URL text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the wrapper and returns the URL text.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ResolvedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ResolvedUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Returns true when the reference carries an inline payload or is a bare anchor.
///
/// The extractor uses this to drop candidates before resolution is attempted.
#[must_use]
pub fn is_inline_or_fragment(reference: &str) -> bool {
    let trimmed = reference.trim_start();
    trimmed.starts_with('#') || has_scheme_prefix(trimmed, "data")
}

/// Resolves `reference` against `base`.
///
/// # Errors
///
/// Returns a [`Rejection`] for inline data, fragment-only references,
/// non-web schemes, and anything that does not parse into a URL with a host.
///
/// # Examples
///
/// ```
/// use harvester_core::resolve::resolve;
/// use url::Url;
///
/// let base = Url::parse("https://site.example/blog/post").unwrap();
/// assert_eq!(
///     resolve("../img/a.png", &base).unwrap().as_str(),
///     "https://site.example/img/a.png"
/// );
/// assert!(resolve("data:image/png;base64,AAAA", &base).is_err());
/// ```
pub fn resolve(reference: &str, base: &Url) -> Result<ResolvedUrl, Rejection> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(Rejection::Empty);
    }
    if reference.starts_with('#') {
        return Err(Rejection::FragmentOnly {
            reference: reference.to_string(),
        });
    }
    if has_scheme_prefix(reference, "data") {
        return Err(Rejection::InlineData);
    }
    if reference.len() > MAX_URL_LENGTH {
        return Err(Rejection::Malformed {
            reference: preview(reference),
            reason: format!("longer than {MAX_URL_LENGTH} characters"),
        });
    }

    if let Some(scheme) = explicit_scheme(reference) {
        let parsed = Url::parse(reference).map_err(|e| Rejection::Malformed {
            reference: reference.to_string(),
            reason: e.to_string(),
        })?;
        check_web_url(&parsed, reference, scheme)?;
        if !reference[scheme.len() + 1..].starts_with("//") {
            return Err(Rejection::Malformed {
                reference: reference.to_string(),
                reason: "missing '//' before the host".to_string(),
            });
        }
        trace!(reference, "absolute reference kept verbatim");
        return Ok(ResolvedUrl(reference.to_string()));
    }

    let joined = base.join(reference).map_err(|e| Rejection::Malformed {
        reference: reference.to_string(),
        reason: e.to_string(),
    })?;
    check_web_url(&joined, reference, joined.scheme())?;
    trace!(reference, resolved = %joined, "relative reference resolved");
    Ok(ResolvedUrl(joined.into()))
}

fn check_web_url(parsed: &Url, reference: &str, scheme: &str) -> Result<(), Rejection> {
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Rejection::UnsupportedScheme {
            reference: reference.to_string(),
            scheme: scheme.to_ascii_lowercase(),
        });
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(Rejection::NoHost {
            reference: reference.to_string(),
        });
    }
    Ok(())
}

/// Returns the scheme when the reference starts with `scheme:` (RFC 3986 grammar).
fn explicit_scheme(reference: &str) -> Option<&str> {
    let colon = reference.find(':')?;
    let candidate = &reference[..colon];
    let mut chars = candidate.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic() {
        return None;
    }
    chars
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        .then_some(candidate)
}

fn has_scheme_prefix(reference: &str, scheme: &str) -> bool {
    explicit_scheme(reference).is_some_and(|found| found.eq_ignore_ascii_case(scheme))
}

fn preview(reference: &str) -> String {
    reference.chars().take(80).collect()
}
