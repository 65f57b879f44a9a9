//! pushproxd — the PushProx daemon.
//!
//! Single binary that can run either side of the reverse-scrape path:
//!
//! - **proxy** — the centrally reachable broker that collectors scrape
//!   through
//! - **client** — the outbound agent co-located with the scrape target
//!
//! # Usage
//!
//! ```text
//! pushproxd proxy --web.listen-address 0.0.0.0:8080 --registration.timeout 5m
//! pushproxd client --proxy-url http://proxy:8080 --pull-url http://localhost:9100/metrics
//! ```

mod client_mode;
mod proxy_mode;

use std::net::SocketAddr;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "pushproxd", about = "PushProx reverse-scrape proxy daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the proxy that collectors scrape through.
    Proxy {
        /// Address to listen on for proxy and client requests.
        #[arg(long = "web.listen-address", default_value = "0.0.0.0:8080")]
        listen_address: SocketAddr,

        /// After how long a client registration expires.
        #[arg(long = "registration.timeout", default_value = "5m")]
        registration_timeout: humantime::Duration,

        /// Cadence of the client registry garbage collector.
        #[arg(long = "gc.interval", default_value = "1m")]
        gc_interval: humantime::Duration,

        /// Logger name attached to all proxy logs so they can be
        /// filtered.
        #[arg(long = "log.name", default_value = "proxyserver")]
        log_name: String,
    },

    /// Run the client agent that polls a proxy and scrapes locally.
    Client {
        /// Base URL of the proxy to poll.
        #[arg(long)]
        proxy_url: String,

        /// URL to scrape when an instruction arrives, typically
        /// http://localhost:9100/metrics.
        #[arg(long)]
        pull_url: String,

        /// FQDN to register with (defaults to the machine hostname).
        #[arg(long)]
        fqdn: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Proxy {
            listen_address,
            registration_timeout,
            gc_interval,
            log_name,
        } => {
            proxy_mode::run_proxy(
                listen_address,
                registration_timeout.into(),
                gc_interval.into(),
                log_name,
            )
            .await
        }
        Command::Client {
            proxy_url,
            pull_url,
            fqdn,
        } => {
            let fqdn = fqdn.unwrap_or_else(default_fqdn);
            client_mode::run_client(proxy_url, pull_url, fqdn).await
        }
    }
}

/// Registration name used when `--fqdn` is not given.
fn default_fqdn() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".into())
}
