//! Scrape deadline header handling.

use std::time::Duration;

use crate::{HeaderMap, SCRAPE_TIMEOUT_HEADER};

/// Deadline applied when a message omits the timeout header.
pub const DEFAULT_SCRAPE_TIMEOUT: Duration = Duration::from_secs(15);

/// Read the scrape deadline from `X-Prometheus-Scrape-Timeout-Seconds`.
///
/// Falls back to [`DEFAULT_SCRAPE_TIMEOUT`] when the header is absent,
/// unparsable, or non-positive.
pub fn scrape_timeout(headers: &HeaderMap) -> Duration {
    headers
        .get(SCRAPE_TIMEOUT_HEADER)
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs > 0.0)
        .map(Duration::from_secs_f64)
        .unwrap_or(DEFAULT_SCRAPE_TIMEOUT)
}

/// Format a remaining deadline the way clients echo it on push.
pub fn format_remaining(remaining: Duration) -> String {
    format!("{}", remaining.as_secs_f64())
}
