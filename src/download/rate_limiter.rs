//! Per-origin pacing of image fetches.
//!
//! [`RateLimiter`] enforces a minimum delay between successive requests to the
//! same host. Requests to different hosts never wait on each other, so a page
//! that mixes a CDN with its own origin keeps both moving.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use harvester_core::download::RateLimiter;
//!
//! # async fn example() {
//! let limiter = Arc::new(RateLimiter::new(Duration::from_millis(100)));
//!
//! // First request to a host proceeds immediately
//! limiter.acquire("https://cdn.example/a.jpg").await;
//!
//! // Second request to the same host waits out the pacing interval
//! limiter.acquire("https://cdn.example/b.jpg").await;
//!
//! // Another host is independent
//! limiter.acquire("https://site.example/c.jpg").await;
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use super::constants::{CUMULATIVE_DELAY_WARNING_THRESHOLD, MAX_RETRY_AFTER};

/// Per-origin pacing shared by all fetch tasks of a run.
///
/// Wrap in `Arc` and clone into spawned tasks. Per-host state lives in a
/// `DashMap`; the `Arc` around each entry lets the map shard lock drop
/// before the per-host `Mutex` is awaited.
#[derive(Debug)]
pub struct RateLimiter {
    /// Minimum delay between requests to the same host.
    default_delay: Duration,

    /// Whether pacing is disabled (`--pacing 0`).
    disabled: bool,

    domains: DashMap<String, Arc<DomainState>>,
}

#[derive(Debug)]
struct DomainState {
    /// Earliest instant the next request may start; `None` until the first request.
    next_allowed: Mutex<Option<Instant>>,

    /// Total delay imposed on this host, in milliseconds.
    cumulative_delay_ms: AtomicU64,
}

impl DomainState {
    fn new() -> Self {
        Self {
            next_allowed: Mutex::new(None),
            cumulative_delay_ms: AtomicU64::new(0),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn add_cumulative_delay(&self, delay: Duration) -> Duration {
        let delay_ms = delay.as_millis() as u64;
        let new_total = self
            .cumulative_delay_ms
            .fetch_add(delay_ms, Ordering::SeqCst)
            + delay_ms;
        Duration::from_millis(new_total)
    }
}

impl RateLimiter {
    /// Creates a limiter that spaces same-host requests by `default_delay`.
    #[must_use]
    #[instrument(skip_all, fields(delay_ms = default_delay.as_millis()))]
    pub fn new(default_delay: Duration) -> Self {
        debug!("creating rate limiter");
        Self {
            default_delay,
            disabled: false,
            domains: DashMap::new(),
        }
    }

    /// Creates a limiter that never waits, including after [`record_rate_limit`](Self::record_rate_limit).
    #[must_use]
    #[instrument]
    pub fn disabled() -> Self {
        debug!("creating disabled rate limiter");
        Self {
            default_delay: Duration::ZERO,
            disabled: true,
            domains: DashMap::new(),
        }
    }

    /// Creates an enabled limiter for a non-zero delay, or a disabled one for zero.
    #[must_use]
    pub fn from_delay(delay: Duration) -> Self {
        if delay.is_zero() {
            Self::disabled()
        } else {
            Self::new(delay)
        }
    }

    /// Returns whether pacing is disabled.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Returns the delay between requests to one host.
    #[must_use]
    pub fn default_delay(&self) -> Duration {
        self.default_delay
    }

    /// Waits until a request to `url`'s host may start, then reserves the slot.
    ///
    /// The first request to a host proceeds immediately. Concurrent callers
    /// for the same host are served one at a time.
    #[instrument(skip(self), fields(domain))]
    pub async fn acquire(&self, url: &str) {
        if self.disabled {
            return;
        }

        let domain = extract_domain(url);
        tracing::Span::current().record("domain", &domain);

        let state = self.state_for(&domain);
        let mut next_allowed = state.next_allowed.lock().await;

        if let Some(at) = *next_allowed {
            let now = Instant::now();
            if at > now {
                let delay = at - now;
                let cumulative = state.add_cumulative_delay(delay);
                debug!(
                    domain = %domain,
                    delay_ms = delay.as_millis(),
                    cumulative_ms = cumulative.as_millis(),
                    "pacing request"
                );
                if cumulative >= CUMULATIVE_DELAY_WARNING_THRESHOLD {
                    warn!(
                        domain = %domain,
                        cumulative_delay_secs = cumulative.as_secs(),
                        "excessive pacing delay - host is throttling or the batch is large"
                    );
                }
                tokio::time::sleep_until(at).await;
            }
        } else {
            debug!(domain = %domain, "first request to domain - no delay");
        }

        *next_allowed = Some(Instant::now() + self.default_delay);
    }

    /// Records a server-mandated pause (from `Retry-After`) for `url`'s host.
    ///
    /// The next [`acquire`](Self::acquire) for the host waits at least `delay`
    /// from now. The delay is capped at one hour.
    #[instrument(skip(self), fields(domain))]
    pub async fn record_rate_limit(&self, url: &str, delay: Duration) {
        if self.disabled {
            return;
        }

        let domain = extract_domain(url);
        tracing::Span::current().record("domain", &domain);

        let delay = delay.min(MAX_RETRY_AFTER);
        let state = self.state_for(&domain);
        let cumulative = state.add_cumulative_delay(delay);
        {
            let mut next_allowed = state.next_allowed.lock().await;
            let until = Instant::now() + delay;
            if (*next_allowed).is_none_or(|current| current < until) {
                *next_allowed = Some(until);
            }
        }

        debug!(
            domain = %domain,
            delay_ms = delay.as_millis(),
            cumulative_ms = cumulative.as_millis(),
            "recorded server rate limit"
        );
        if cumulative >= CUMULATIVE_DELAY_WARNING_THRESHOLD {
            warn!(
                domain = %domain,
                cumulative_delay_secs = cumulative.as_secs(),
                "excessive server rate limiting - site may be under heavy load"
            );
        }
    }

    fn state_for(&self, domain: &str) -> Arc<DomainState> {
        self.domains
            .entry(domain.to_string())
            .or_insert_with(|| Arc::new(DomainState::new()))
            .clone()
    }
}

/// Extracts the lowercase host from a URL, or `"unknown"` when it has none.
///
/// # Examples
///
/// ```
/// use harvester_core::download::rate_limiter::extract_domain;
///
/// assert_eq!(extract_domain("https://CDN.Example/a.jpg"), "cdn.example");
/// assert_eq!(extract_domain("https://localhost:8080/x"), "localhost");
/// assert_eq!(extract_domain("not a url"), "unknown");
/// ```
#[must_use]
pub fn extract_domain(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Parses a `Retry-After` header value (RFC 7231 seconds or HTTP-date).
///
/// Returns `None` if the value cannot be parsed. Caps excessive values at 1 hour.
///
/// ```
/// use std::time::Duration;
/// use harvester_core::download::rate_limiter::parse_retry_after;
///
/// assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
/// assert_eq!(parse_retry_after("invalid"), None);
/// ```
#[must_use]
#[instrument]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<i64>() {
        if seconds < 0 {
            debug!(seconds, "negative Retry-After value, ignoring");
            return None;
        }

        #[allow(clippy::cast_sign_loss)]
        let duration = Duration::from_secs(seconds as u64);
        if duration > MAX_RETRY_AFTER {
            warn!(
                seconds,
                max_seconds = MAX_RETRY_AFTER.as_secs(),
                "Retry-After exceeds maximum, capping at 1 hour"
            );
            return Some(MAX_RETRY_AFTER);
        }
        return Some(duration);
    }

    let Ok(datetime) = httpdate::parse_http_date(header_value) else {
        debug!(header_value, "unparseable Retry-After value");
        return None;
    };
    match datetime.duration_since(std::time::SystemTime::now()) {
        Ok(duration) if duration > MAX_RETRY_AFTER => {
            warn!(
                delay_secs = duration.as_secs(),
                max_secs = MAX_RETRY_AFTER.as_secs(),
                "Retry-After date exceeds maximum, capping at 1 hour"
            );
            Some(MAX_RETRY_AFTER)
        }
        Ok(duration) => Some(duration),
        Err(_) => {
            debug!(header_value, "Retry-After date is in the past, returning zero");
            Some(Duration::ZERO)
        }
    }
}
