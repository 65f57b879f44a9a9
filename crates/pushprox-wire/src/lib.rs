//! pushprox-wire — the HTTP/1.1 wire format shared by proxy and client.
//!
//! A scrape request travels proxy→client as the raw body of a `/poll`
//! response, and the scrape's outcome travels client→proxy as the raw
//! body of a `/push` request. This crate parses and serializes those
//! messages and owns the two internal correlation headers that ride
//! along with them.

mod error;
mod header;
mod request;
mod response;
mod timeout;

pub use error::{WireError, WireResult};
pub use header::HeaderMap;
pub use request::ScrapeRequest;
pub use response::ScrapeResponse;
pub use timeout::{format_remaining, scrape_timeout, DEFAULT_SCRAPE_TIMEOUT};

/// Correlation header linking a dispatched scrape request to its pushed
/// response. Added by the proxy, echoed by the client, stripped before
/// the response reaches the collector.
pub const ID_HEADER: &str = "Id";

/// Deadline header set by the collector on the inbound scrape and
/// echoed by the client (as remaining seconds) on its push. Stripped
/// before the response reaches the collector.
pub const SCRAPE_TIMEOUT_HEADER: &str = "X-Prometheus-Scrape-Timeout-Seconds";

/// Upper bound on the header count of a wire-format message.
pub(crate) const MAX_HEADERS: usize = 64;
