//! Scrape correlation ids.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Mints ids unique for the lifetime of one proxy process.
///
/// The format is opaque to the protocol: ids correlate a dispatched
/// request with its pushed response and carry no authenticity.
#[derive(Debug)]
pub(crate) struct IdSource {
    started: u64,
    pid: u32,
    counter: AtomicU64,
}

impl IdSource {
    pub(crate) fn new() -> Self {
        Self {
            started: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            pid: std::process::id(),
            counter: AtomicU64::new(0),
        }
    }

    pub(crate) fn next(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{}-{}", self.started, n, self.pid)
    }
}
