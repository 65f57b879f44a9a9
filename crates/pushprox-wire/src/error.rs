//! Wire codec error types.

use thiserror::Error;

/// Errors from parsing or serializing wire-format HTTP messages.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("message truncated before end of header section")]
    Incomplete,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

pub type WireResult<T> = Result<T, WireError>;
