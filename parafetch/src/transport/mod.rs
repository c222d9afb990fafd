//! Network collaborator for ranged downloads.
//!
//! The orchestrator only talks to the network through [`HttpClient`], which
//! keeps workers testable with in-memory clients. Retrying transient failures
//! is the client's job; the production [`ReqwestClient`] does it under a
//! [`RetryPolicy`].

mod http;
mod retry;

pub use http::{parse_content_range_total, ReqwestClient, DEFAULT_TIMEOUT_SECS};
pub use retry::{RetryPolicy, DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_INITIAL_DELAY_MS, DEFAULT_MAX_DELAY_SECS};

use std::fmt;
use std::io::Read;

use thiserror::Error;

use crate::chunk::Chunk;

/// Errors surfaced by a transport after its own retries are exhausted.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The URL could not be parsed.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    /// The request failed before a response was received.
    #[error("request failed: {0}")]
    Request(String),

    /// The request timed out.
    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The server answered with a non-success status.
    #[error("HTTP status {status}")]
    Http { status: u16 },
}

/// Whether the server advertises byte-range support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSupport {
    /// `Accept-Ranges: bytes` or a `206` answer to a ranged probe.
    Bytes,
    /// `Accept-Ranges: none`.
    None,
    /// No indication either way.
    Unknown,
}

impl RangeSupport {
    /// Parse an `Accept-Ranges` header value.
    pub fn from_header(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if v == "bytes" => Self::Bytes,
            Some(v) if v == "none" => Self::None,
            _ => Self::Unknown,
        }
    }
}

/// Result of a length-discovery request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Probe {
    /// Total length of the resource, if the server reported one.
    pub content_length: Option<u64>,
    /// Range support advertised by the server.
    pub ranges: RangeSupport,
}

/// Response to a ranged GET.
pub struct RangeResponse {
    /// HTTP status code.
    pub status: u16,
    /// Streaming body; read incrementally, never buffered whole.
    pub body: Box<dyn Read + Send>,
}

impl RangeResponse {
    /// Create a response from a status and a body reader.
    pub fn new(status: u16, body: impl Read + Send + 'static) -> Self {
        Self {
            status,
            body: Box::new(body),
        }
    }
}

impl fmt::Debug for RangeResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RangeResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// A reusable network client capable of ranged fetches.
///
/// Implementations are held in a [`ClientPool`](crate::pool::ClientPool) and
/// used by at most one worker at a time, but must be `Send + Sync` so the pool
/// can be shared across worker threads.
pub trait HttpClient: Send + Sync {
    /// Discover the total length of `url`.
    fn probe(&self, url: &str) -> Result<Probe, TransportError>;

    /// Request the bytes of `chunk` from `url`.
    ///
    /// A non-success status is returned as a response, not an error, so the
    /// caller decides how to treat it.
    fn fetch_range(&self, url: &str, chunk: &Chunk) -> Result<RangeResponse, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_support_from_header() {
        assert_eq!(RangeSupport::from_header(Some("bytes")), RangeSupport::Bytes);
        assert_eq!(RangeSupport::from_header(Some(" Bytes ")), RangeSupport::Bytes);
        assert_eq!(RangeSupport::from_header(Some("none")), RangeSupport::None);
        assert_eq!(RangeSupport::from_header(None), RangeSupport::Unknown);
        assert_eq!(RangeSupport::from_header(Some("x")), RangeSupport::Unknown);
    }

    #[test]
    fn test_transport_error_display() {
        assert_eq!(TransportError::Http { status: 404 }.to_string(), "HTTP status 404");
        assert_eq!(
            TransportError::Timeout { secs: 30 }.to_string(),
            "request timed out after 30s"
        );
    }
}
