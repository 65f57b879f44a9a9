//! Known-client registry.
//!
//! Tracks the instant of each client's most recent poll. Liveness is
//! defined by the registration window at read time; the periodic sweep
//! only reclaims memory for clients that stopped polling.

use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub(crate) struct KnownClients {
    entries: HashMap<String, Instant>,
}

impl KnownClients {
    /// Record a poll from `key` now.
    pub(crate) fn touch(&mut self, key: &str) {
        self.entries.insert(key.to_string(), Instant::now());
    }

    /// Keys seen within `window` of now, sorted for stable output.
    pub(crate) fn live(&self, window: Duration) -> Vec<String> {
        let now = Instant::now();
        let mut live: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, seen)| now.duration_since(**seen) <= window)
            .map(|(key, _)| key.clone())
            .collect();
        live.sort();
        live
    }

    /// Drop entries older than `window`. Returns (deleted, remaining).
    pub(crate) fn sweep(&mut self, window: Duration) -> (usize, usize) {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries
            .retain(|_, seen| now.duration_since(*seen) <= window);
        (before - self.entries.len(), self.entries.len())
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
