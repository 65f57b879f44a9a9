//! Proxy mode — serves the broker front door.
//!
//! In this mode, the daemon:
//! 1. Creates the coordinator
//! 2. Spawns the registry garbage collector
//! 3. Serves the HTTP front door until ctrl-c

use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, Instrument};

use pushprox_coordinator::Coordinator;

/// Run the proxy until ctrl-c.
pub async fn run_proxy(
    listen_address: SocketAddr,
    registration_timeout: Duration,
    gc_interval: Duration,
    log_name: String,
) -> anyhow::Result<()> {
    let span = tracing::info_span!("proxy", logger = %log_name);
    run(listen_address, registration_timeout, gc_interval)
        .instrument(span)
        .await
}

async fn run(
    listen_address: SocketAddr,
    registration_timeout: Duration,
    gc_interval: Duration,
) -> anyhow::Result<()> {
    info!(?registration_timeout, "PushProx proxy starting");
    let coordinator = Coordinator::new(registration_timeout);

    // ── Shutdown signal ────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Registry garbage collector ─────────────────────────────
    let gc_coordinator = coordinator.clone();
    let gc_shutdown = shutdown_rx.clone();
    let gc_handle = tokio::spawn(async move {
        gc_coordinator.run_gc(gc_interval, gc_shutdown).await;
    });

    // ── Front door ─────────────────────────────────────────────
    let router = pushprox_proxy::build_router(coordinator);
    let listener = tokio::net::TcpListener::bind(listen_address).await?;
    info!(%listen_address, "listening");

    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });
    server.await?;

    let _ = gc_handle.await;
    info!("proxy stopped");
    Ok(())
}
