//! pushprox-client — the outbound polling agent.
//!
//! Runs next to the scrape target, long-polls the proxy's `/poll`
//! endpoint with its FQDN, performs each received scrape against the
//! configured pull URL, and pushes the outcome back to `/push`. Only
//! outbound connections are ever opened, which is the whole point:
//! the target can live behind NAT or a firewall.

mod agent;

pub use agent::{AgentConfig, PollAgent};
pub use reqwest::Url;
