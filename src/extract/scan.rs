//! Lightweight tag scanner that pulls raw image references out of markup.
//!
//! This is pattern matching over raw text, not an HTML parser: a tag whose
//! quoting is broken simply fails to match and contributes nothing.

use std::borrow::Cow;
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::trace;

/// Matches one start tag. Quoted attribute values may contain `>`.
#[allow(clippy::expect_used)]
pub(super) static TAG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<([A-Za-z][A-Za-z0-9-]*)((?:[^>"']|"[^"]*"|'[^']*')*)>"#)
        .expect("tag regex is valid") // Static pattern, safe to panic
});

/// Matches `name=value` pairs with double-quoted, single-quoted or bare values.
#[allow(clippy::expect_used)]
static ATTRIBUTE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([^\s=/"'<>]+)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+))"#)
        .expect("attribute regex is valid")
});

#[allow(clippy::expect_used)]
static COMMENT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("comment regex is valid"));

/// One `background` / `background-image` declaration body.
#[allow(clippy::expect_used)]
static BACKGROUND_DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[;\s{])background(?:-image)?\s*:([^;]*)")
        .expect("background regex is valid")
});

#[allow(clippy::expect_used)]
static CSS_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)url\(\s*(?:"([^"]*)"|'([^']*)'|([^)"']*))\s*\)"#)
        .expect("css url regex is valid")
});

/// Lazy-load attributes read from image elements in addition to `src`.
const LAZY_SOURCE_ATTRIBUTES: &[&str] = &["data-src", "data-lazy-src", "data-original"];

/// `srcset`-style attributes read from image and alternate-source elements.
const SRCSET_ATTRIBUTES: &[&str] = &["srcset", "data-srcset"];

/// Markup shape a candidate was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    /// `<img src>`.
    Src,
    /// `<img data-src>` and friends.
    DataSrc,
    /// URL token of one `<img srcset>` entry.
    SrcsetEntry,
    /// URL token of one `<source srcset>` entry.
    SourceSrcset,
    /// `url(...)` inside an inline `background`/`background-image` style.
    BackgroundImage,
}

/// A raw, unresolved image reference found in markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageCandidate {
    /// Reference text as written (entity-decoded, trimmed).
    pub raw_reference: String,
    /// Which markup shape produced it.
    pub attribute_kind: AttributeKind,
}

impl ImageCandidate {
    fn new(raw_reference: &str, attribute_kind: AttributeKind) -> Option<Self> {
        let trimmed = raw_reference.trim();
        (!trimmed.is_empty()).then(|| Self {
            raw_reference: trimmed.to_string(),
            attribute_kind,
        })
    }
}

/// A start tag with its lowercase name and decoded attributes.
#[derive(Debug)]
pub(super) struct StartTag {
    pub(super) name: String,
    pub(super) start: usize,
    pub(super) end: usize,
    attributes: Vec<(String, String)>,
}

impl StartTag {
    /// Returns the first value of `name` (case-insensitive), if present.
    pub(super) fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub(super) fn is_self_closing(&self, raw: &str) -> bool {
        raw[self.start..self.end].trim_end_matches('>').ends_with('/')
    }
}

/// Byte ranges of every `<!-- ... -->` comment in `html`.
pub(super) fn comment_spans(html: &str) -> Vec<Range<usize>> {
    COMMENT_PATTERN
        .find_iter(html)
        .map(|m| m.start()..m.end())
        .collect()
}

pub(super) fn in_comment(spans: &[Range<usize>], offset: usize) -> bool {
    spans.iter().any(|span| span.contains(&offset))
}

/// Iterates start tags in document order, skipping tags inside comments.
pub(super) fn start_tags(html: &str) -> impl Iterator<Item = StartTag> + '_ {
    let comments = comment_spans(html);
    TAG_PATTERN.captures_iter(html).filter_map(move |caps| {
        let whole = caps.get(0)?;
        if in_comment(&comments, whole.start()) {
            return None;
        }
        let name = caps.get(1)?.as_str().to_ascii_lowercase();
        let attributes = caps
            .get(2)
            .map(|m| parse_attributes(m.as_str()))
            .unwrap_or_default();
        Some(StartTag {
            name,
            start: whole.start(),
            end: whole.end(),
            attributes,
        })
    })
}

fn parse_attributes(raw: &str) -> Vec<(String, String)> {
    ATTRIBUTE_PATTERN
        .captures_iter(raw)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str().to_ascii_lowercase();
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map_or("", |m| m.as_str());
            Some((name, decode_entities(value).into_owned()))
        })
        .collect()
}

/// Scans `html` for image references in every supported markup shape.
///
/// Candidates are returned in document order; within one tag the order is
/// `src`, lazy-load attributes, `srcset` entries, then inline backgrounds.
/// HTML comments are ignored.
#[must_use]
pub fn scan_candidates(html: &str) -> Vec<ImageCandidate> {
    let mut candidates = Vec::new();

    for tag in start_tags(html) {
        match tag.name.as_str() {
            "img" => {
                push_attribute(&mut candidates, &tag, "src", AttributeKind::Src);
                for attribute in LAZY_SOURCE_ATTRIBUTES {
                    push_attribute(&mut candidates, &tag, attribute, AttributeKind::DataSrc);
                }
                push_srcsets(&mut candidates, &tag, AttributeKind::SrcsetEntry);
            }
            "source" => push_srcsets(&mut candidates, &tag, AttributeKind::SourceSrcset),
            _ => {}
        }

        if let Some(style) = tag.attribute("style") {
            let before = candidates.len();
            candidates.extend(
                background_urls(style)
                    .into_iter()
                    .filter_map(|url| ImageCandidate::new(url, AttributeKind::BackgroundImage)),
            );
            if candidates.len() == before && style.to_ascii_lowercase().contains("background") {
                trace!(tag = %tag.name, "background style without a usable url()");
            }
        }
    }

    candidates
}

fn push_attribute(
    candidates: &mut Vec<ImageCandidate>,
    tag: &StartTag,
    attribute: &str,
    kind: AttributeKind,
) {
    if let Some(candidate) = tag
        .attribute(attribute)
        .and_then(|value| ImageCandidate::new(value, kind))
    {
        candidates.push(candidate);
    }
}

fn push_srcsets(candidates: &mut Vec<ImageCandidate>, tag: &StartTag, kind: AttributeKind) {
    for attribute in SRCSET_ATTRIBUTES {
        if let Some(value) = tag.attribute(attribute) {
            candidates.extend(
                srcset_urls(value)
                    .into_iter()
                    .filter_map(|url| ImageCandidate::new(url, kind)),
            );
        }
    }
}

/// Splits a `srcset` value into the URL token of each entry.
///
/// Width/density descriptors after the first whitespace are discarded.
#[must_use]
pub fn srcset_urls(srcset: &str) -> Vec<&str> {
    srcset
        .split(',')
        .filter_map(|entry| entry.split_whitespace().next())
        .collect()
}

/// Returns every `url(...)` value of `background` / `background-image`
/// declarations in an inline style, with surrounding quotes stripped.
#[must_use]
pub fn background_urls(style: &str) -> Vec<&str> {
    BACKGROUND_DECLARATION
        .captures_iter(style)
        .filter_map(|caps| caps.get(1))
        .flat_map(|declaration| {
            CSS_URL.captures_iter(declaration.as_str()).filter_map(|url| {
                url.get(1)
                    .or_else(|| url.get(2))
                    .or_else(|| url.get(3))
                    .map(|m| m.as_str().trim())
            })
        })
        .filter(|url| !url.is_empty())
        .collect()
}

/// Decodes the handful of entities that show up inside URL-bearing attributes.
pub(super) fn decode_entities(value: &str) -> Cow<'_, str> {
    if !value.contains('&') {
        return Cow::Borrowed(value);
    }
    Cow::Owned(
        value
            .replace("&quot;", "\"")
            .replace("&#34;", "\"")
            .replace("&#39;", "'")
            .replace("&#x27;", "'")
            .replace("&apos;", "'")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&#38;", "&")
            .replace("&amp;", "&"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs(html: &str) -> Vec<(String, AttributeKind)> {
        scan_candidates(html)
            .into_iter()
            .map(|c| (c.raw_reference, c.attribute_kind))
            .collect()
    }

    #[test]
    fn test_scan_img_src() {
        assert_eq!(
            refs(r#"<p>x</p><img alt="a" src="/a.jpg"><img src='b.png'><img src=c.gif>"#),
            vec![
                ("/a.jpg".to_string(), AttributeKind::Src),
                ("b.png".to_string(), AttributeKind::Src),
                ("c.gif".to_string(), AttributeKind::Src),
            ]
        );
    }

    #[test]
    fn test_scan_data_src_is_additional_source() {
        assert_eq!(
            refs(r#"<img src="placeholder.gif" data-src="real.jpg">"#),
            vec![
                ("placeholder.gif".to_string(), AttributeKind::Src),
                ("real.jpg".to_string(), AttributeKind::DataSrc),
            ]
        );
    }

    #[test]
    fn test_scan_data_src_does_not_match_as_src() {
        let found = refs(r#"<img data-src="lazy.jpg">"#);
        assert_eq!(found, vec![("lazy.jpg".to_string(), AttributeKind::DataSrc)]);
    }

    #[test]
    fn test_scan_srcset_keeps_url_tokens_only() {
        assert_eq!(
            refs(r#"<img srcset="a-1x.jpg 1x, a-2x.jpg 2x,a-480.jpg   480w">"#),
            vec![
                ("a-1x.jpg".to_string(), AttributeKind::SrcsetEntry),
                ("a-2x.jpg".to_string(), AttributeKind::SrcsetEntry),
                ("a-480.jpg".to_string(), AttributeKind::SrcsetEntry),
            ]
        );
    }

    #[test]
    fn test_scan_picture_source_srcset() {
        let html = r#"<picture>
            <source type="image/webp" srcset="/hero.webp 1x, /hero@2x.webp 2x">
            <img src="/hero.jpg">
        </picture>"#;
        assert_eq!(
            refs(html),
            vec![
                ("/hero.webp".to_string(), AttributeKind::SourceSrcset),
                ("/hero@2x.webp".to_string(), AttributeKind::SourceSrcset),
                ("/hero.jpg".to_string(), AttributeKind::Src),
            ]
        );
    }

    #[test]
    fn test_scan_background_image_styles() {
        let html = r#"<div style="color:red; background-image: url('/bg1.jpg')"></div>
            <section style="background: #fff url(&quot;/bg2.png&quot;) no-repeat"></section>
            <span style='background-image:url(/bg3.webp), url("/bg4.webp")'></span>"#;
        assert_eq!(
            refs(html),
            vec![
                ("/bg1.jpg".to_string(), AttributeKind::BackgroundImage),
                ("/bg2.png".to_string(), AttributeKind::BackgroundImage),
                ("/bg3.webp".to_string(), AttributeKind::BackgroundImage),
                ("/bg4.webp".to_string(), AttributeKind::BackgroundImage),
            ]
        );
    }

    #[test]
    fn test_scan_ignores_other_url_properties() {
        assert!(refs(r#"<div style="list-style-image: url(/bullet.png)"></div>"#).is_empty());
    }

    #[test]
    fn test_scan_malformed_quoting_degrades_silently() {
        let html = r#"<img src="/broken.jpg><p>text</p><img src="/ok.jpg">"#;
        let found = refs(html);
        assert!(
            !found.iter().any(|(r, _)| r == "/broken.jpg"),
            "broken tag must not produce a candidate: {found:?}"
        );
    }

    #[test]
    fn test_scan_quoted_gt_inside_attribute() {
        assert_eq!(
            refs(r#"<img alt="a > b" src="/a.jpg">"#),
            vec![("/a.jpg".to_string(), AttributeKind::Src)]
        );
    }

    #[test]
    fn test_scan_decodes_entities() {
        assert_eq!(
            refs(r#"<img src="/img.php?id=1&amp;w=800">"#),
            vec![("/img.php?id=1&w=800".to_string(), AttributeKind::Src)]
        );
    }

    #[test]
    fn test_scan_skips_comments() {
        assert!(refs(r#"<!-- <img src="/old.jpg"> -->"#).is_empty());
    }

    #[test]
    fn test_scan_uppercase_markup() {
        assert_eq!(
            refs(r#"<IMG SRC="/A.JPG">"#),
            vec![("/A.JPG".to_string(), AttributeKind::Src)]
        );
    }

    #[test]
    fn test_scan_empty_values_are_dropped() {
        assert!(refs(r#"<img src="" data-src="  " srcset="">"#).is_empty());
    }

    #[test]
    fn test_srcset_urls_skips_empty_entries() {
        assert_eq!(srcset_urls("a.jpg 1x, , b.jpg"), vec!["a.jpg", "b.jpg"]);
    }
}
