//! Front-door request handlers.
//!
//! Every request lands in [`dispatch`], which routes on the request
//! target: a non-empty URL host means a collector scrape; otherwise the
//! literal path selects the client-facing or discovery surface.

use std::collections::HashMap;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use pushprox_wire::{scrape_timeout, HeaderMap, ScrapeRequest, ScrapeResponse};

use crate::ProxyState;

/// Serialized form of one live client for service discovery.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct TargetGroup {
    pub targets: Vec<String>,
    pub labels: HashMap<String, String>,
}

pub async fn dispatch(State(state): State<ProxyState>, req: Request) -> Response {
    if req.uri().host().is_some() {
        return scrape(state, req).await;
    }
    match req.uri().path() {
        "/poll" => poll(state, req).await,
        "/push" => push(state, req).await,
        "/clients" => clients(state).await,
        _ => (StatusCode::NOT_FOUND, "404: Unknown path").into_response(),
    }
}

/// Collector scrape: hand the request to the coordinator and relay the
/// target's response verbatim.
async fn scrape(state: ProxyState, req: Request) -> Response {
    let (parts, _body) = req.into_parts();
    let headers = HeaderMap::from_http(&parts.headers);
    let timeout = scrape_timeout(&headers);
    let deadline = Instant::now() + timeout;
    let url = parts.uri.to_string();
    debug!(%url, ?timeout, "scraping");

    let request = ScrapeRequest::new(parts.method, parts.uri, headers);
    match state.coordinator.do_scrape(request, deadline).await {
        Ok(response) => relay_response(response),
        Err(err) => {
            error!(%url, error = %err, "error scraping");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error scraping {url:?}: {err}"),
            )
                .into_response()
        }
    }
}

/// Client long poll: the trimmed body is the FQDN to wait on.
async fn poll(state: ProxyState, req: Request) -> Response {
    let body = match read_body(req).await {
        Ok(body) => body,
        Err(response) => return response,
    };
    let key = normalize_target_key(String::from_utf8_lossy(&body).trim());

    let request = state.coordinator.wait_for_instruction(&key).await;
    debug!(
        key = %key,
        url = %request.uri,
        scrape_id = request.id().unwrap_or(""),
        "responded to /poll"
    );
    request.encode().into_response()
}

/// Client push: the body is the wire-format scrape response.
async fn push(state: ProxyState, req: Request) -> Response {
    let body = match read_body(req).await {
        Ok(body) => body,
        Err(response) => return response,
    };
    let response = match ScrapeResponse::parse(&body) {
        Ok(response) => response,
        Err(err) => {
            warn!(error = %err, "discarding malformed push");
            return (StatusCode::BAD_REQUEST, format!("Error pushing: {err}")).into_response();
        }
    };
    let scrape_id = response.id().unwrap_or("").to_string();
    debug!(%scrape_id, "got /push");

    match state.coordinator.deliver_scrape_result(response).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => {
            error!(%scrape_id, error = %err, "error pushing");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error pushing: {err}"),
            )
                .into_response()
        }
    }
}

/// Service discovery: one target group per live client.
async fn clients(state: ProxyState) -> Response {
    let known = state.coordinator.live_clients();
    info!(client_count = known.len(), "responded to /clients");
    let groups: Vec<TargetGroup> = known
        .into_iter()
        .map(|key| TargetGroup {
            targets: vec![key],
            labels: HashMap::new(),
        })
        .collect();
    Json(groups).into_response()
}

/// Relay the target's status, headers, and body to the collector.
fn relay_response(response: ScrapeResponse) -> Response {
    let mut out = Response::builder().status(response.status);
    if let Some(headers) = out.headers_mut() {
        *headers = response.headers.to_http();
    }
    out.body(Body::from(response.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// `/poll` body → target key: trimmed, `:80` appended when no port is
/// given.
fn normalize_target_key(fqdn: &str) -> String {
    if fqdn.contains(':') {
        fqdn.to_string()
    } else {
        format!("{fqdn}:80")
    }
}

async fn read_body(req: Request) -> Result<bytes::Bytes, Response> {
    axum::body::to_bytes(req.into_body(), usize::MAX)
        .await
        .map_err(|err| {
            warn!(error = %err, "failed to read request body");
            (StatusCode::BAD_REQUEST, "failed to read request body").into_response()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_defaults_port_80() {
        assert_eq!(normalize_target_key("host1"), "host1:80");
    }

    #[test]
    fn key_keeps_explicit_port() {
        assert_eq!(normalize_target_key("host1:9100"), "host1:9100");
    }

    #[test]
    fn target_group_shape() {
        let group = TargetGroup {
            targets: vec!["host1:80".to_string()],
            labels: HashMap::new(),
        };
        assert_eq!(
            serde_json::to_string(&group).unwrap(),
            r#"{"targets":["host1:80"],"labels":{}}"#
        );
    }

    #[test]
    fn relayed_response_keeps_status_and_headers() {
        let mut response = ScrapeResponse::new(http::StatusCode::NOT_FOUND);
        response.headers.insert("Content-Type", "text/plain");

        let relayed = relay_response(response);
        assert_eq!(relayed.status(), StatusCode::NOT_FOUND);
        assert_eq!(relayed.headers().get("Content-Type").unwrap(), "text/plain");
    }
}
