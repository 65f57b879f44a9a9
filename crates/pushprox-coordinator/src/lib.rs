//! pushprox-coordinator — the rendezvous broker at the heart of the proxy.
//!
//! Matches incoming collector scrapes to long-polling clients and pipes
//! each pushed response back to the scrape that is waiting for it.
//!
//! ```text
//! Coordinator
//!   ├── do_scrape()              ← collector-side handler, one per scrape
//!   ├── wait_for_instruction()   ← client /poll handler, blocks until matched
//!   ├── deliver_scrape_result()  ← client /push handler
//!   ├── live_clients()           ← /clients service discovery
//!   └── run_gc()                 → periodic registry sweep
//! ```
//!
//! Requests and responses are handed over through one-slot rendezvous,
//! never buffered: a scrape request exists only while its collector is
//! still waiting on it, so disconnects cancel cleanly on both sides.

mod coordinator;
mod delivery;
mod error;
mod id;
mod registry;
mod rendezvous;

pub use coordinator::Coordinator;
pub use error::{ScrapeError, ScrapeResult};
