//! Heuristic discovery of image URLs in a saved web page.
//!
//! Extraction is best-effort and never fails: markup that no heuristic
//! recognizes is skipped, and the worst case is an empty result.
//!
//! # Example
//!
//! ```
//! use harvester_core::extract::{CandidateExtractor, Document};
//! use url::Url;
//!
//! let html = r#"<article><img src="/a.jpg"><img data-src="https://cdn.x/b.png"></article>"#;
//! let doc = Document::new(html, Url::parse("https://site.example/post").unwrap());
//! let urls = CandidateExtractor::default().extract(&doc);
//!
//! let found: Vec<&str> = urls.iter().map(|u| u.as_str()).collect();
//! assert_eq!(found, ["https://site.example/a.jpg", "https://cdn.x/b.png"]);
//! ```

mod scan;
mod scope;

pub use scan::{AttributeKind, ImageCandidate, background_urls, scan_candidates, srcset_urls};
pub use scope::{Scope, ScopeKind, narrow_scope};

use std::collections::HashSet;

use tracing::{debug, instrument, trace};
use url::Url;

use crate::config::DEFAULT_CONTENT_CLASS_HINTS;
use crate::resolve::{ResolvedUrl, is_inline_or_fragment, resolve};

use scan::start_tags;

/// A page's markup together with the URL it was fetched from.
#[derive(Debug, Clone)]
pub struct Document {
    raw_html: String,
    base_url: Url,
}

impl Document {
    /// Creates a document from its markup and source URL.
    #[must_use]
    pub fn new(raw_html: impl Into<String>, base_url: Url) -> Self {
        Self {
            raw_html: raw_html.into(),
            base_url,
        }
    }

    /// Returns the raw markup.
    #[must_use]
    pub fn raw_html(&self) -> &str {
        &self.raw_html
    }

    /// Returns the URL the document was fetched from.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Returns true when the markup is empty or whitespace only.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.raw_html.trim().is_empty()
    }

    /// Base used for relative references: the first `<base href>` outside a
    /// comment, resolved against the document URL, or the document URL itself.
    #[must_use]
    pub fn effective_base(&self) -> Url {
        start_tags(&self.raw_html)
            .find(|tag| tag.name == "base" && tag.attribute("href").is_some())
            .and_then(|tag| tag.attribute("href").map(str::trim).map(str::to_string))
            .and_then(|href| self.base_url.join(&href).ok())
            .filter(|base| matches!(base.scheme(), "http" | "https"))
            .unwrap_or_else(|| self.base_url.clone())
    }
}

/// Looks for the page's own URL in `<link rel="canonical">` or `og:url` metadata.
///
/// Saved pages often lose their origin; this recovers it when the page
/// declares one. Only absolute http(s) URLs are accepted.
#[must_use]
pub fn discover_document_url(html: &str) -> Option<Url> {
    start_tags(html).find_map(|tag| {
        let declared = match tag.name.as_str() {
            "link"
                if tag
                    .attribute("rel")
                    .is_some_and(|rel| rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("canonical"))) =>
            {
                tag.attribute("href")
            }
            "meta" if tag.attribute("property") == Some("og:url") => tag.attribute("content"),
            _ => None,
        }?;
        Url::parse(declared.trim())
            .ok()
            .filter(|url| matches!(url.scheme(), "http" | "https") && url.host_str().is_some())
    })
}

/// Insertion-ordered set of resolved URLs; uniqueness is exact string equality.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedUrlSet {
    urls: Vec<ResolvedUrl>,
    seen: HashSet<String>,
}

impl ResolvedUrlSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `url`, returning false if it was already present.
    pub fn insert(&mut self, url: ResolvedUrl) -> bool {
        if !self.seen.insert(url.as_str().to_string()) {
            return false;
        }
        self.urls.push(url);
        true
    }

    /// Returns true if `url` is present.
    #[must_use]
    pub fn contains(&self, url: &str) -> bool {
        self.seen.contains(url)
    }

    /// Number of distinct URLs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.urls.len()
    }

    /// Returns true if no URLs were collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    /// Iterates URLs in discovery order.
    pub fn iter(&self) -> std::slice::Iter<'_, ResolvedUrl> {
        self.urls.iter()
    }

    /// Returns the URLs as plain strings in discovery order.
    #[must_use]
    pub fn to_strings(&self) -> Vec<String> {
        self.urls.iter().map(|u| u.as_str().to_string()).collect()
    }

    /// Consumes the set, returning URLs in discovery order.
    #[must_use]
    pub fn into_vec(self) -> Vec<ResolvedUrl> {
        self.urls
    }
}

impl<'a> IntoIterator for &'a ResolvedUrlSet {
    type Item = &'a ResolvedUrl;
    type IntoIter = std::slice::Iter<'a, ResolvedUrl>;

    fn into_iter(self) -> Self::IntoIter {
        self.urls.iter()
    }
}

/// Scoped, deduplicating image URL extractor.
#[derive(Debug, Clone)]
pub struct CandidateExtractor {
    content_hints: Vec<String>,
}

impl Default for CandidateExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_CONTENT_CLASS_HINTS.iter().map(ToString::to_string))
    }
}

impl CandidateExtractor {
    /// Creates an extractor with a custom content-container class allow-list.
    #[must_use]
    pub fn new<I, S>(content_hints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            content_hints: content_hints.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the content-container class allow-list.
    #[must_use]
    pub fn content_hints(&self) -> &[String] {
        &self.content_hints
    }

    /// Extracts the deduplicated, resolved image URLs of `document`.
    ///
    /// Running this twice on the same document yields the identical ordered set.
    #[instrument(skip(self, document), fields(html_len = document.raw_html().len(), base = %document.base_url()))]
    #[must_use]
    pub fn extract(&self, document: &Document) -> ResolvedUrlSet {
        let base = document.effective_base();
        let scope = narrow_scope(document.raw_html(), &self.content_hints);
        let candidates = scan_candidates(scope.html);

        let mut urls = ResolvedUrlSet::new();
        let mut rejected = 0usize;
        let mut duplicates = 0usize;

        for candidate in &candidates {
            if is_inline_or_fragment(&candidate.raw_reference) {
                rejected += 1;
                continue;
            }
            match resolve(&candidate.raw_reference, &base) {
                Ok(url) => {
                    if !urls.insert(url) {
                        duplicates += 1;
                    }
                }
                Err(reason) => {
                    trace!(
                        reference = %candidate.raw_reference,
                        kind = ?candidate.attribute_kind,
                        %reason,
                        "candidate rejected"
                    );
                    rejected += 1;
                }
            }
        }

        debug!(
            scope = ?scope.kind,
            candidates = candidates.len(),
            resolved = urls.len(),
            rejected,
            duplicates,
            "extraction complete"
        );
        urls
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn doc(html: &str, base: &str) -> Document {
        Document::new(html, Url::parse(base).unwrap())
    }

    fn extract(html: &str, base: &str) -> Vec<String> {
        CandidateExtractor::default()
            .extract(&doc(html, base))
            .to_strings()
    }

    #[test]
    fn test_extract_article_scenario() {
        let html = r#"<article><img src="/a.jpg"><img data-src="https://cdn.x/b.png" srcset="https://cdn.x/b-2x.png 2x"></article>"#;
        assert_eq!(
            extract(html, "https://site.example/post"),
            vec![
                "https://site.example/a.jpg",
                "https://cdn.x/b.png",
                "https://cdn.x/b-2x.png",
            ]
        );
    }

    #[test]
    fn test_extract_absolute_src_unchanged() {
        let urls = [
            "https://images.example.com/a/B.JPG",
            "http://example.org/x.png?size=large&v=2",
            "https://cdn.example.net/path%20with/space.webp",
        ];
        let html: String = urls
            .iter()
            .map(|u| format!(r#"<img src="{}">"#, u.replace('&', "&amp;")))
            .collect();
        assert_eq!(extract(&html, "https://site.example/post"), urls);
    }

    #[test]
    fn test_extract_dedups_src_and_data_src() {
        let html = r#"<img src="/same.jpg" data-src="https://site.example/same.jpg"><img src="same.jpg">"#;
        assert_eq!(
            extract(html, "https://site.example/post"),
            vec!["https://site.example/same.jpg"]
        );
    }

    #[test]
    fn test_extract_is_idempotent() {
        let html = r#"<div class="post-content"><img src="a.jpg"><div style="background:url(b.jpg)"></div>
            <picture><source srcset="c.webp 1x, d.webp 2x"><img src="a.jpg"></picture></div>"#;
        let extractor = CandidateExtractor::default();
        let document = doc(html, "https://site.example/blog/");
        let first = extractor.extract(&document);
        let second = extractor.extract(&document);
        assert_eq!(first, second);
        assert_eq!(
            first.to_strings(),
            vec![
                "https://site.example/blog/a.jpg",
                "https://site.example/blog/b.jpg",
                "https://site.example/blog/c.webp",
                "https://site.example/blog/d.webp",
            ]
        );
    }

    #[test]
    fn test_extract_filters_inline_data_and_fragments() {
        let html = r##"<img src="data:image/gif;base64,R0lGODlhAQABAAAAACw=" data-src="/real.jpg">
            <img src="#"><div style="background-image:url('#none')"></div>"##;
        assert_eq!(
            extract(html, "https://site.example/"),
            vec!["https://site.example/real.jpg"]
        );
    }

    #[test]
    fn test_extract_scoping_excludes_outside_images() {
        let html = r#"<header><img src="/logo.png"></header><article><img src="/in.jpg"></article><footer><img src="/f.png"></footer>"#;
        assert_eq!(
            extract(html, "https://site.example/post"),
            vec!["https://site.example/in.jpg"]
        );
    }

    #[test]
    fn test_extract_custom_hints() {
        let html = r#"<img src="/nav.png"><div class="story__text"><img src="/story.jpg"></div>"#;
        let extractor = CandidateExtractor::new(["story__text"]);
        let urls = extractor.extract(&doc(html, "https://site.example/"));
        assert_eq!(urls.to_strings(), vec!["https://site.example/story.jpg"]);
    }

    #[test]
    fn test_extract_empty_document_yields_empty_set() {
        let urls = CandidateExtractor::default().extract(&doc("", "https://site.example/"));
        assert!(urls.is_empty());
    }

    #[test]
    fn test_extract_honors_base_href() {
        let html = r#"<head><base href="https://static.example/assets/"></head><img src="a.jpg">"#;
        assert_eq!(
            extract(html, "https://site.example/post"),
            vec!["https://static.example/assets/a.jpg"]
        );
    }

    #[test]
    fn test_extract_ignores_commented_out_article() {
        let html = r#"<!-- <article>old teaser</article> --><article><img src="/a.jpg"></article>"#;
        assert_eq!(
            extract(html, "https://site.example/post"),
            vec!["https://site.example/a.jpg"]
        );
    }

    #[test]
    fn test_extract_ignores_commented_out_base_href() {
        let html = r#"<!-- <base href="https://old.example/"> --><article><img src="a.jpg"></article>"#;
        assert_eq!(
            extract(html, "https://site.example/post"),
            vec!["https://site.example/a.jpg"]
        );
    }

    #[test]
    fn test_discover_document_url_skips_comments() {
        let html = r#"<!-- <link rel="canonical" href="https://old.example/p"> -->
            <meta property="og:url" content="https://site.example/p">"#;
        assert_eq!(
            discover_document_url(html).unwrap().as_str(),
            "https://site.example/p"
        );
    }

    #[test]
    fn test_discover_document_url_canonical() {
        let html = r#"<head><link rel="canonical" href="https://site.example/post/1"></head>"#;
        assert_eq!(
            discover_document_url(html).unwrap().as_str(),
            "https://site.example/post/1"
        );
    }

    #[test]
    fn test_discover_document_url_og_url() {
        let html = r#"<meta property="og:url" content="https://site.example/p">"#;
        assert_eq!(
            discover_document_url(html).unwrap().as_str(),
            "https://site.example/p"
        );
    }

    #[test]
    fn test_discover_document_url_none() {
        assert!(discover_document_url(r#"<link rel="canonical" href="/relative">"#).is_none());
        assert!(discover_document_url("<p>nothing</p>").is_none());
    }

    #[test]
    fn test_resolved_url_set_insertion_order() {
        let base = Url::parse("https://x.example/").unwrap();
        let mut set = ResolvedUrlSet::new();
        assert!(set.insert(resolve("/b", &base).unwrap()));
        assert!(set.insert(resolve("/a", &base).unwrap()));
        assert!(!set.insert(resolve("https://x.example/b", &base).unwrap()));
        assert_eq!(set.len(), 2);
        assert!(set.contains("https://x.example/a"));
        assert_eq!(
            set.to_strings(),
            vec!["https://x.example/b", "https://x.example/a"]
        );
    }
}
