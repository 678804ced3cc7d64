//! Retry decisions with exponential backoff for transient fetch failures.
//!
//! The fetcher itself never retries; the pipeline consults a [`RetryPolicy`]
//! after each failed attempt. Errors are first classified into a
//! [`FailureType`]:
//! - [`FailureType::Transient`] - may succeed on retry (timeouts, 5xx, 408)
//! - [`FailureType::Permanent`] - will not succeed (404, 403, invalid URL, local I/O)
//! - [`FailureType::RateLimited`] - HTTP 429; retried, honoring `Retry-After`
//!
//! # Example
//!
//! ```
//! use harvester_core::download::{DownloadError, RetryDecision, RetryPolicy, classify_error};
//!
//! let policy = RetryPolicy::with_max_attempts(3);
//! let error = DownloadError::http_status("https://cdn.example/a.jpg", 503);
//!
//! match policy.should_retry(classify_error(&error), 1) {
//!     RetryDecision::Retry { delay, attempt } => assert_eq!(attempt, 2),
//!     RetryDecision::DoNotRetry { reason } => panic!("{reason}"),
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use tracing::{debug, instrument};

use super::DownloadError;
use super::rate_limiter::parse_retry_after;

/// Default base delay for exponential backoff (1 second).
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default maximum delay cap (32 seconds).
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(32);

/// Default backoff multiplier (doubles each attempt).
const DEFAULT_BACKOFF_MULTIPLIER: f32 = 2.0;

/// Maximum jitter added to delays (500ms).
const MAX_JITTER: Duration = Duration::from_millis(500);

/// Classification of fetch failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    /// Temporary failure that may succeed on retry.
    Transient,

    /// Failure that won't succeed regardless of retries.
    Permanent,

    /// Server rate limiting (HTTP 429).
    RateLimited,
}

/// Decision on whether to retry a failed fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed, so first retry is attempt 2).
        attempt: u32,
    },

    /// Give up on this asset.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Retry behavior with exponential backoff.
///
/// ```text
/// delay = min(base_delay * multiplier^(attempt-1), max_delay) + jitter
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f32,
}

impl Default for RetryPolicy {
    /// A single attempt: no retries.
    fn default() -> Self {
        Self::with_max_attempts(1)
    }
}

impl RetryPolicy {
    /// Creates a retry policy with custom settings.
    #[must_use]
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f32,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            backoff_multiplier,
        }
    }

    /// Creates a policy with a custom `max_attempts`, using defaults for other settings.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self::new(
            max_attempts,
            DEFAULT_BASE_DELAY,
            DEFAULT_MAX_DELAY,
            DEFAULT_BACKOFF_MULTIPLIER,
        )
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decides whether to retry after `attempt` (1-indexed) failed with `failure_type`.
    #[instrument(skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        if failure_type == FailureType::Permanent {
            return RetryDecision::DoNotRetry {
                reason: "permanent failure - retry would not help".to_string(),
            };
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let delay = self.calculate_delay(attempt);
        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            "will retry"
        );
        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    /// Like [`should_retry`](Self::should_retry), but waits at least as long as
    /// the server's `Retry-After` when the error carries one.
    #[must_use]
    pub fn decide(&self, error: &DownloadError, attempt: u32) -> RetryDecision {
        match self.should_retry(classify_error(error), attempt) {
            RetryDecision::Retry { delay, attempt } => RetryDecision::Retry {
                delay: server_retry_after(error).map_or(delay, |server| server.max(delay)),
                attempt,
            },
            no => no,
        }
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let multiplier = f64::from(self.backoff_multiplier);
        let exponent = f64::from(attempt.saturating_sub(1));
        let delay_ms = base_ms * multiplier.powf(exponent);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        Duration::from_millis(capped_ms as u64) + jitter()
    }
}

/// Random jitter in `0..=MAX_JITTER` so simultaneous failures spread out.
#[allow(clippy::cast_possible_truncation)]
fn jitter() -> Duration {
    let mut rng = rand::thread_rng();
    Duration::from_millis(rng.gen_range(0..=MAX_JITTER.as_millis() as u64))
}

/// Returns the parsed `Retry-After` of a 429 response, if any.
#[must_use]
pub fn server_retry_after(error: &DownloadError) -> Option<Duration> {
    match error {
        DownloadError::HttpStatus {
            status: 429,
            retry_after: Some(value),
            ..
        } => parse_retry_after(value),
        _ => None,
    }
}

/// Classifies a fetch error for retry decisions.
///
/// | Error | Type |
/// |-------|------|
/// | HTTP 408, 5xx | Transient |
/// | HTTP 429 | RateLimited |
/// | other HTTP 4xx and non-error codes | Permanent |
/// | Timeout | Transient |
/// | Network (TLS) | Permanent |
/// | Network (other) | Transient |
/// | IO, InvalidUrl | Permanent |
#[instrument]
pub fn classify_error(error: &DownloadError) -> FailureType {
    match error {
        DownloadError::HttpStatus { status, .. } => classify_http_status(*status),
        DownloadError::Timeout { .. } => FailureType::Transient,
        DownloadError::Network { source, .. } => {
            if is_tls_error(source) {
                FailureType::Permanent
            } else {
                FailureType::Transient
            }
        }
        DownloadError::Io { .. } | DownloadError::InvalidUrl { .. } => FailureType::Permanent,
    }
}

fn classify_http_status(status: u16) -> FailureType {
    match status {
        408 => FailureType::Transient,
        429 => FailureType::RateLimited,
        500..=599 => FailureType::Transient,
        _ => FailureType::Permanent,
    }
}

fn is_tls_error(error: &reqwest::Error) -> bool {
    let error_string = error.to_string().to_lowercase();
    error_string.contains("certificate")
        || error_string.contains("tls")
        || error_string.contains("ssl")
        || error_string.contains("handshake")
}
