//! Constants for the download module (timeouts, pacing, file naming).

use std::time::Duration;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large images).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Warning threshold for cumulative pacing delay per origin (30 seconds).
pub const CUMULATIVE_DELAY_WARNING_THRESHOLD: Duration = Duration::from_secs(30);

/// Maximum Retry-After header value (1 hour) to prevent excessive delays.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Suffix of the in-progress sibling a fetch streams into.
pub const PARTIAL_SUFFIX: &str = ".part";

/// URL path segments shorter than this get a positional placeholder name.
pub const MIN_SEGMENT_NAME_LEN: usize = 3;

/// Extension used for positional placeholder names.
pub const PLACEHOLDER_EXTENSION: &str = ".jpg";
