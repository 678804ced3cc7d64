//! User-Agent string for image fetches.
//!
//! Image CDNs routinely refuse requests without a browser identity, so the
//! default header mirrors a desktop browser.

/// Desktop browser identity sent with every fetch unless overridden.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";
