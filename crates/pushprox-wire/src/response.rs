//! Wire-format scrape responses.
//!
//! The client serializes the outcome of its local scrape as a raw
//! HTTP/1.1 response and POSTs it to `/push`. Parsing is best-effort:
//! the body is whatever follows the header section, clamped to
//! `Content-Length` when one is present.

use bytes::Bytes;
use http::StatusCode;

use crate::{HeaderMap, WireError, WireResult, ID_HEADER, MAX_HEADERS, SCRAPE_TIMEOUT_HEADER};

/// A scrape response in transit between client, proxy, and collector.
#[derive(Debug, Clone)]
pub struct ScrapeResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ScrapeResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// The correlation id echoed by the client, if any.
    pub fn id(&self) -> Option<&str> {
        self.headers.get(ID_HEADER)
    }

    /// Remove the internal correlation headers so they cannot leak to
    /// the collector.
    pub fn strip_internal_headers(&mut self) {
        self.headers.remove(ID_HEADER);
        self.headers.remove(SCRAPE_TIMEOUT_HEADER);
    }

    /// Serialize as an HTTP/1.1 response. A `Content-Length` header is
    /// synthesized when the headers do not already carry one.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(256 + self.body.len());
        out.extend_from_slice(
            format!(
                "HTTP/1.1 {} {}\r\n",
                self.status.as_u16(),
                self.status.canonical_reason().unwrap_or("")
            )
            .as_bytes(),
        );
        for (name, value) in self.headers.iter() {
            out.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        if !self.headers.contains("Content-Length") {
            out.extend_from_slice(format!("Content-Length: {}\r\n", self.body.len()).as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        out
    }

    /// Parse a wire-format response from a buffer.
    pub fn parse(buf: &[u8]) -> WireResult<Self> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut res = httparse::Response::new(&mut headers);
        match res
            .parse(buf)
            .map_err(|e| WireError::InvalidResponse(e.to_string()))?
        {
            httparse::Status::Partial => Err(WireError::Incomplete),
            httparse::Status::Complete(header_len) => {
                let code = res
                    .code
                    .ok_or_else(|| WireError::InvalidResponse("missing status code".into()))?;
                let status = StatusCode::from_u16(code)
                    .map_err(|e| WireError::InvalidResponse(e.to_string()))?;
                let headers: HeaderMap = res
                    .headers
                    .iter()
                    .map(|h| {
                        (
                            h.name.to_string(),
                            String::from_utf8_lossy(h.value).into_owned(),
                        )
                    })
                    .collect();

                let rest = &buf[header_len..];
                let body_len = headers
                    .get("Content-Length")
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .map(|len| len.min(rest.len()))
                    .unwrap_or(rest.len());

                Ok(Self {
                    status,
                    headers,
                    body: Bytes::copy_from_slice(&rest[..body_len]),
                })
            }
        }
    }
}
