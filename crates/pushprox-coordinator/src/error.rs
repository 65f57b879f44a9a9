//! Coordinator error types.

use thiserror::Error;

/// Errors surfaced by scrape orchestration and response delivery.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// No client picked the request up before the scrape deadline.
    #[error("Matching client not found for {url:?}: scrape deadline exceeded")]
    NoClientMatched { url: String },

    /// The scrape target URL does not name a host to route by.
    #[error("scrape target {url:?} is not an absolute URL")]
    InvalidTarget { url: String },

    /// No response was delivered before the scrape deadline.
    #[error("scrape {id} timed out waiting for the client push")]
    ScrapeTimedOut { id: String },

    /// A pushed response found no waiting scrape within the push timeout.
    #[error("push for scrape {id} timed out: no pending scrape consumed it")]
    PushTimedOut { id: String },

    /// A pushed response carried no `Id` header.
    #[error("push is missing the Id header")]
    MissingId,
}

pub type ScrapeResult<T> = Result<T, ScrapeError>;
