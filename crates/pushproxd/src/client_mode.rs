//! Client mode — runs the polling agent.
//!
//! In this mode, the daemon:
//! 1. Validates the proxy and pull URLs
//! 2. Spawns the poll loop
//! 3. Waits for ctrl-c, then shuts the loop down

use anyhow::Context;
use tokio::sync::watch;
use tracing::info;

use pushprox_client::{AgentConfig, PollAgent, Url};

/// Run the client agent until ctrl-c.
pub async fn run_client(proxy_url: String, pull_url: String, fqdn: String) -> anyhow::Result<()> {
    let config = AgentConfig {
        proxy_url: Url::parse(&proxy_url).context("invalid --proxy-url")?,
        pull_url: Url::parse(&pull_url).context("invalid --pull-url")?,
        fqdn,
    };
    info!(
        proxy = %config.proxy_url,
        pull = %config.pull_url,
        fqdn = %config.fqdn,
        "PushProx client starting"
    );

    let agent = PollAgent::new(config);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let agent_handle = tokio::spawn(async move { agent.run(shutdown_rx).await });

    tokio::signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C handler");
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
    let _ = agent_handle.await;

    info!("client stopped");
    Ok(())
}
