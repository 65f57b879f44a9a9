//! End-to-end scrape tests over a real listener.
//!
//! The collector side goes through `reqwest::Proxy` so requests reach
//! the proxy in absolute form, exactly as Prometheus sends them. The
//! client side is driven by hand so the tests control scrape latency.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::StatusCode;

use pushprox_coordinator::Coordinator;
use pushprox_proxy::build_router;
use pushprox_wire::{ScrapeRequest, ScrapeResponse, ID_HEADER, SCRAPE_TIMEOUT_HEADER};

async fn spawn_proxy(registration_timeout: Duration) -> SocketAddr {
    let router = build_router(Coordinator::new(registration_timeout));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// A collector whose scrapes are routed through the proxy.
fn collector(proxy: SocketAddr) -> reqwest::Client {
    reqwest::Client::builder()
        .proxy(reqwest::Proxy::http(format!("http://{proxy}")).unwrap())
        .build()
        .unwrap()
}

/// Long-poll the proxy as a client registered under `fqdn`.
async fn poll(proxy: SocketAddr, fqdn: &str) -> ScrapeRequest {
    let body = reqwest::Client::new()
        .post(format!("http://{proxy}/poll"))
        .body(fqdn.to_string())
        .send()
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    ScrapeRequest::parse(&body).unwrap()
}

async fn push(proxy: SocketAddr, response: &ScrapeResponse) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("http://{proxy}/push"))
        .body(response.encode())
        .send()
        .await
        .unwrap()
}

/// Build the push a client would send back for `request`.
fn respond_to(
    request: &ScrapeRequest,
    status: StatusCode,
    body: &'static [u8],
    remaining: &str,
) -> ScrapeResponse {
    let mut response = ScrapeResponse::new(status);
    response
        .headers
        .insert(ID_HEADER, request.id().expect("request has an id"));
    response.headers.insert(SCRAPE_TIMEOUT_HEADER, remaining);
    response.headers.insert("Content-Type", "text/plain");
    response.body = Bytes::from_static(body);
    response
}

async fn live_targets(proxy: SocketAddr) -> Vec<String> {
    let body = reqwest::Client::new()
        .get(format!("http://{proxy}/clients"))
        .send()
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    let groups: Vec<serde_json::Value> = serde_json::from_slice(&body).unwrap();
    groups
        .iter()
        .map(|g| g["targets"][0].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn happy_path_scrape_round_trip() {
    let proxy = spawn_proxy(Duration::from_secs(300)).await;

    let client = tokio::spawn(async move {
        let request = poll(proxy, "host1").await;
        assert_eq!(request.uri.to_string(), "http://host1/metrics");
        assert!(request.id().is_some());
        push(proxy, &respond_to(&request, StatusCode::OK, b"m 1\n", "8")).await
    });

    let resp = collector(proxy)
        .get("http://host1/metrics")
        .header(SCRAPE_TIMEOUT_HEADER, "10")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().get(ID_HEADER).is_none());
    assert!(resp.headers().get(SCRAPE_TIMEOUT_HEADER).is_none());
    assert_eq!(resp.headers().get("Content-Type").unwrap(), "text/plain");
    assert_eq!(resp.text().await.unwrap(), "m 1\n");

    let pushed = client.await.unwrap();
    assert_eq!(pushed.status(), StatusCode::OK);
}

#[tokio::test]
async fn absent_client_returns_500_within_deadline() {
    let proxy = spawn_proxy(Duration::from_secs(300)).await;

    let started = Instant::now();
    let resp = collector(proxy)
        .get("http://absent/")
        .header(SCRAPE_TIMEOUT_HEADER, "1")
        .send()
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = resp.text().await.unwrap();
    assert!(
        body.contains(r#"Matching client not found for "http://absent/""#),
        "body: {body}"
    );
    assert!(
        elapsed >= Duration::from_millis(800) && elapsed < Duration::from_secs(3),
        "deadline not honored: {elapsed:?}"
    );
}

#[tokio::test]
async fn late_push_times_out_on_both_sides() {
    let proxy = spawn_proxy(Duration::from_secs(300)).await;

    let client = tokio::spawn(async move {
        let request = poll(proxy, "slow").await;
        tokio::time::sleep(Duration::from_millis(900)).await;
        push(proxy, &respond_to(&request, StatusCode::OK, b"late", "0.1")).await
    });

    let resp = collector(proxy)
        .get("http://slow/metrics")
        .header(SCRAPE_TIMEOUT_HEADER, "0.5")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(resp.text().await.unwrap().contains("timed out"));

    let pushed = client.await.unwrap();
    assert_eq!(pushed.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(pushed.text().await.unwrap().contains("Error pushing"));
}

#[tokio::test]
async fn push_after_collector_disconnect_recovers() {
    let proxy = spawn_proxy(Duration::from_secs(300)).await;

    let client = tokio::spawn(async move {
        let request = poll(proxy, "host1").await;
        tokio::time::sleep(Duration::from_millis(600)).await;
        push(proxy, &respond_to(&request, StatusCode::OK, b"m 1\n", "0.2")).await
    });

    // The collector gives up 300 ms in; dropping the request closes its
    // connection.
    let impatient = reqwest::Client::builder()
        .proxy(reqwest::Proxy::http(format!("http://{proxy}")).unwrap())
        .timeout(Duration::from_millis(300))
        .build()
        .unwrap();
    let abandoned = impatient
        .get("http://host1/metrics")
        .header(SCRAPE_TIMEOUT_HEADER, "5")
        .send()
        .await;
    assert!(abandoned.is_err());

    // The late push is answered rather than wedging the proxy.
    let pushed = client.await.unwrap();
    assert!(
        pushed.status() == StatusCode::OK
            || pushed.status() == StatusCode::INTERNAL_SERVER_ERROR,
        "unexpected push status: {}",
        pushed.status()
    );

    // And the same target scrapes cleanly afterwards.
    let client = tokio::spawn(async move {
        let request = poll(proxy, "host1").await;
        push(proxy, &respond_to(&request, StatusCode::OK, b"m 2\n", "5")).await
    });
    let resp = collector(proxy)
        .get("http://host1/metrics")
        .header(SCRAPE_TIMEOUT_HEADER, "5")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "m 2\n");
    client.await.unwrap();
}

#[tokio::test]
async fn client_churn_tracks_liveness() {
    let proxy = spawn_proxy(Duration::from_millis(800)).await;
    let http = reqwest::Client::new();

    // 100 clients poll, disconnect, and poll again; each poll times out
    // client-side because no scrape ever arrives.
    for _ in 0..2 {
        let polls = (0..100).map(|i| {
            let http = http.clone();
            async move {
                let _ = http
                    .post(format!("http://{proxy}/poll"))
                    .timeout(Duration::from_millis(100))
                    .body(format!("churn-{i}"))
                    .send()
                    .await;
            }
        });
        futures::future::join_all(polls).await;
    }

    let targets = live_targets(proxy).await;
    assert_eq!(targets.len(), 100);
    assert!(targets.contains(&"churn-0:80".to_string()));
    assert!(targets.contains(&"churn-99:80".to_string()));

    // With no further polls the window empties.
    tokio::time::sleep(Duration::from_millis(900)).await;
    assert!(live_targets(proxy).await.is_empty());
}
