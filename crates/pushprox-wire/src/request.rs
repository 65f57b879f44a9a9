//! Wire-format scrape requests.
//!
//! A scrape request is relayed to the polling client as a raw HTTP/1.1
//! request with an absolute-form target, the same shape the collector
//! sends to a forward proxy. Scrapes are idempotent GETs and carry no
//! body.

use http::{Method, Uri};

use crate::{HeaderMap, WireError, WireResult, ID_HEADER, MAX_HEADERS};

/// A scrape request in transit between collector, proxy, and client.
#[derive(Debug, Clone)]
pub struct ScrapeRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
}

impl ScrapeRequest {
    pub fn new(method: Method, uri: Uri, headers: HeaderMap) -> Self {
        Self {
            method,
            uri,
            headers,
        }
    }

    /// Routing key for this request: `host:port`, port 80 when the
    /// target URL does not name one.
    pub fn target_key(&self) -> WireResult<String> {
        let host = self
            .uri
            .host()
            .ok_or_else(|| WireError::InvalidRequest("request target has no host".into()))?;
        let port = self.uri.port_u16().unwrap_or(80);
        Ok(format!("{host}:{port}"))
    }

    /// The correlation id attached by the proxy, if any.
    pub fn id(&self) -> Option<&str> {
        self.headers.get(ID_HEADER)
    }

    /// Serialize as an absolute-form HTTP/1.1 request (no body).
    ///
    /// A `Host` header is synthesized from the target when the request
    /// does not already carry one.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(256);
        out.extend_from_slice(format!("{} {} HTTP/1.1\r\n", self.method, self.uri).as_bytes());
        if !self.headers.contains("Host") {
            if let Some(authority) = self.uri.authority() {
                out.extend_from_slice(format!("Host: {authority}\r\n").as_bytes());
            }
        }
        for (name, value) in self.headers.iter() {
            out.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        out
    }

    /// Parse a wire-format request from a buffer.
    pub fn parse(buf: &[u8]) -> WireResult<Self> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut headers);
        match req
            .parse(buf)
            .map_err(|e| WireError::InvalidRequest(e.to_string()))?
        {
            httparse::Status::Partial => Err(WireError::Incomplete),
            httparse::Status::Complete(_) => {
                let method = req
                    .method
                    .ok_or_else(|| WireError::InvalidRequest("missing method".into()))?
                    .parse::<Method>()
                    .map_err(|e| WireError::InvalidRequest(e.to_string()))?;
                let uri = req
                    .path
                    .ok_or_else(|| WireError::InvalidRequest("missing request target".into()))?
                    .parse::<Uri>()
                    .map_err(|e| WireError::InvalidRequest(e.to_string()))?;
                let headers = req
                    .headers
                    .iter()
                    .map(|h| {
                        (
                            h.name.to_string(),
                            String::from_utf8_lossy(h.value).into_owned(),
                        )
                    })
                    .collect();
                Ok(Self {
                    method,
                    uri,
                    headers,
                })
            }
        }
    }
}
