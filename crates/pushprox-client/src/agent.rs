//! Polling agent — long-polls the proxy, scrapes locally, pushes back.

use std::time::Duration;

use anyhow::Context;
use http::StatusCode;
use reqwest::Url;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use pushprox_wire::{
    format_remaining, scrape_timeout, HeaderMap, ScrapeRequest, ScrapeResponse, ID_HEADER,
    SCRAPE_TIMEOUT_HEADER,
};

/// How long to back off after a failed poll before trying again.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Configuration for the polling agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Base URL of the proxy to poll.
    pub proxy_url: Url,
    /// URL scraped locally when an instruction arrives.
    pub pull_url: Url,
    /// FQDN (optionally with `:port`) to register under.
    pub fqdn: String,
}

/// The agent maintaining the outbound long poll.
pub struct PollAgent {
    config: AgentConfig,
    http: reqwest::Client,
}

impl PollAgent {
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config,
            // No overall timeout: the poll intentionally blocks until
            // the proxy has a scrape for us.
            http: reqwest::Client::new(),
        }
    }

    /// Run the poll loop until shutdown.
    ///
    /// Each received instruction is scraped and pushed on its own task
    /// so a slow target never stalls the next poll.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            fqdn = %self.config.fqdn,
            proxy = %self.config.proxy_url,
            pull = %self.config.pull_url,
            "poll loop started"
        );
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("poll loop shutting down");
                    break;
                }
                polled = self.poll_once() => match polled {
                    Ok(request) => {
                        let http = self.http.clone();
                        let proxy_url = self.config.proxy_url.clone();
                        let pull_url = self.config.pull_url.clone();
                        tokio::spawn(async move {
                            if let Err(err) =
                                scrape_and_push(http, proxy_url, pull_url, request).await
                            {
                                warn!(error = %format!("{err:#}"), "failed to push scrape result");
                            }
                        });
                    }
                    Err(err) => {
                        warn!(error = %format!("{err:#}"), "poll failed");
                        tokio::time::sleep(POLL_RETRY_DELAY).await;
                    }
                }
            }
        }
    }

    async fn poll_once(&self) -> anyhow::Result<ScrapeRequest> {
        let url = self
            .config
            .proxy_url
            .join("/poll")
            .context("building poll url")?;
        let response = self
            .http
            .post(url)
            .body(self.config.fqdn.clone())
            .send()
            .await
            .context("polling proxy")?;
        let body = response.bytes().await.context("reading poll response")?;
        let request = ScrapeRequest::parse(&body).context("decoding scrape instruction")?;
        info!(
            scrape_id = request.id().unwrap_or(""),
            url = %request.uri,
            "got scrape request"
        );
        Ok(request)
    }
}

/// Perform one scrape locally and push the outcome back to the proxy.
///
/// A failed scrape still pushes: the collector gets a 500 whose body
/// names the cause instead of a bare broken pipe.
async fn scrape_and_push(
    http: reqwest::Client,
    proxy_url: Url,
    pull_url: Url,
    request: ScrapeRequest,
) -> anyhow::Result<()> {
    let timeout = scrape_timeout(&request.headers);
    let deadline = Instant::now() + timeout;
    let id = request.id().unwrap_or("").to_string();

    let mut response = match scrape(&http, &pull_url, &request, timeout).await {
        Ok(response) => {
            debug!(scrape_id = %id, status = %response.status, "retrieved scrape response");
            response
        }
        Err(err) => {
            warn!(scrape_id = %id, error = %format!("{err:#}"), "failed to scrape");
            let mut response = ScrapeResponse::new(StatusCode::INTERNAL_SERVER_ERROR);
            response.body = format!("Failed to scrape {pull_url}: {err:#}").into();
            response
        }
    };
    response.headers.set(ID_HEADER, id.clone());
    response.headers.set(
        SCRAPE_TIMEOUT_HEADER,
        format_remaining(deadline.saturating_duration_since(Instant::now())),
    );

    let push_url = proxy_url.join("/push").context("building push url")?;
    let pushed = http
        .post(push_url)
        .body(response.encode())
        .send()
        .await
        .context("pushing scrape result")?;
    debug!(scrape_id = %id, status = %pushed.status(), "pushed scrape result");
    Ok(())
}

/// Scrape the configured pull URL and capture the outcome as a
/// wire-format response.
async fn scrape(
    http: &reqwest::Client,
    pull_url: &Url,
    request: &ScrapeRequest,
    timeout: Duration,
) -> anyhow::Result<ScrapeResponse> {
    let url = rewrite_pull_url(pull_url, request);
    let response = http
        .get(url.clone())
        .timeout(timeout)
        .send()
        .await
        .with_context(|| format!("scraping {url}"))?;

    let status = response.status();
    let mut headers = HeaderMap::new();
    for (name, value) in response.headers() {
        if is_hop_by_hop(name.as_str()) {
            continue;
        }
        headers.insert(
            name.as_str(),
            String::from_utf8_lossy(value.as_bytes()).into_owned(),
        );
    }
    // The body is fully buffered, so any transfer-framing headers from
    // the target no longer apply; encode() restates the length.
    headers.remove("Content-Length");
    let body = response.bytes().await.context("reading scrape body")?;

    Ok(ScrapeResponse {
        status,
        headers,
        body,
    })
}

/// The instruction's URL is replaced by the configured pull URL; only
/// its query string carries over, so collector parameters (e.g.
/// `module=` for exporters) survive the rewrite.
fn rewrite_pull_url(pull_url: &Url, request: &ScrapeRequest) -> Url {
    let mut url = pull_url.clone();
    url.set_query(request.uri.query());
    url
}

fn is_hop_by_hop(name: &str) -> bool {
    name.eq_ignore_ascii_case("connection")
        || name.eq_ignore_ascii_case("keep-alive")
        || name.eq_ignore_ascii_case("proxy-connection")
        || name.eq_ignore_ascii_case("transfer-encoding")
        || name.eq_ignore_ascii_case("upgrade")
}

#[cfg(test)]
mod tests {
    use super::*;

    use http::Method;

    fn instruction(url: &str) -> ScrapeRequest {
        ScrapeRequest::new(Method::GET, url.parse().unwrap(), HeaderMap::new())
    }

    #[test]
    fn rewrite_keeps_configured_url() {
        let pull: Url = "http://localhost:9100/metrics".parse().unwrap();
        let url = rewrite_pull_url(&pull, &instruction("http://host1/other"));
        assert_eq!(url.as_str(), "http://localhost:9100/metrics");
    }

    #[test]
    fn rewrite_carries_query_over() {
        let pull: Url = "http://localhost:9100/probe".parse().unwrap();
        let url = rewrite_pull_url(&pull, &instruction("http://host1/probe?module=icmp&x=1"));
        assert_eq!(url.as_str(), "http://localhost:9100/probe?module=icmp&x=1");
    }

    #[test]
    fn rewrite_clears_stale_query() {
        let pull: Url = "http://localhost:9100/metrics?old=1".parse().unwrap();
        let url = rewrite_pull_url(&pull, &instruction("http://host1/metrics"));
        assert_eq!(url.as_str(), "http://localhost:9100/metrics");
    }

    #[test]
    fn hop_by_hop_headers_detected() {
        assert!(is_hop_by_hop("Transfer-Encoding"));
        assert!(is_hop_by_hop("connection"));
        assert!(!is_hop_by_hop("Content-Type"));
    }
}
