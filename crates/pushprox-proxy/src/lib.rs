//! pushprox-proxy — HTTP front door for the scrape broker.
//!
//! One listener serves four surfaces:
//!
//! | Target | Caller | Description |
//! |---|---|---|
//! | absolute-form URL | collector | Proxied scrape; the target's response streams back |
//! | `/poll` | client | Long poll; responds with a wire-format scrape request |
//! | `/push` | client | Accepts the wire-format scrape response |
//! | `/clients` | discovery | JSON target groups for live clients |
//!
//! Anything else is a 404.

pub mod handlers;

use axum::Router;

use pushprox_coordinator::Coordinator;

/// Shared state for front-door handlers.
#[derive(Clone)]
pub struct ProxyState {
    pub coordinator: Coordinator,
}

/// Build the proxy router.
///
/// Dispatch runs in a single fallback so that the absolute-form host
/// check always wins over literal paths: a scrape for
/// `http://target:9100/poll` must scrape, not long-poll.
pub fn build_router(coordinator: Coordinator) -> Router {
    Router::new()
        .fallback(handlers::dispatch)
        .with_state(ProxyState { coordinator })
}
