//! Blocking `reqwest` transport with retry.

use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, RANGE};
use tracing::{debug, warn};

use super::retry::{is_retryable_status, RetryPolicy};
use super::{HttpClient, Probe, RangeResponse, RangeSupport, TransportError};
use crate::chunk::Chunk;

/// Default timeout for HTTP requests in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300; // 5 minutes

// =============================================================================
// Reqwest Client
// =============================================================================

/// HTTP client backed by `reqwest::blocking`.
///
/// Each instance owns its own connection pool, so a pooled `ReqwestClient`
/// keeps its keep-alive connection between chunks.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: Client,
    retry: RetryPolicy,
    timeout: Duration,
}

impl ReqwestClient {
    /// Create a client with the default timeout and no retries.
    pub fn new() -> Result<Self, TransportError> {
        Self::with_settings(Duration::from_secs(DEFAULT_TIMEOUT_SECS), RetryPolicy::None)
    }

    /// Create a client with a custom timeout and retry policy.
    pub fn with_settings(timeout: Duration, retry: RetryPolicy) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("parafetch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;

        Ok(Self {
            client,
            retry,
            timeout,
        })
    }

    /// The retry policy applied to every request.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// The per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send a request, retrying transport errors and retryable statuses.
    ///
    /// After the last attempt a retryable status is handed back as a response
    /// so the caller sees the real status code.
    fn send_with_retry<F>(&self, url: &str, build: F) -> Result<Response, TransportError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let failure = match build().send() {
                Ok(response) if !is_retryable_status(response.status().as_u16()) => {
                    return Ok(response);
                }
                Ok(response) => match self.retry.delay_for_attempt(attempt) {
                    None => return Ok(response),
                    Some(_) => format!("status {}", response.status()),
                },
                Err(e) => {
                    let err = self.map_error(&e);
                    if self.retry.delay_for_attempt(attempt).is_none() {
                        return Err(err);
                    }
                    err.to_string()
                }
            };

            if let Some(delay) = self.retry.delay_for_attempt(attempt) {
                warn!(
                    url,
                    attempt,
                    max_attempts = self.retry.max_attempts(),
                    delay_ms = delay.as_millis() as u64,
                    "Transient failure ({}), retrying",
                    failure
                );
                thread::sleep(delay);
            }
        }
    }

    fn map_error(&self, e: &reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout {
                secs: self.timeout.as_secs(),
            }
        } else if e.is_builder() {
            TransportError::InvalidUrl(e.to_string())
        } else {
            TransportError::Request(e.to_string())
        }
    }

    /// Fallback probe for servers that reject or under-report `HEAD`.
    fn probe_with_range(&self, url: &str) -> Result<Probe, TransportError> {
        let response = self.send_with_retry(url, || self.client.get(url).header(RANGE, "bytes=0-0"))?;
        let status = response.status().as_u16();

        match status {
            206 => {
                let total = header_str(&response, CONTENT_RANGE.as_str())
                    .and_then(parse_content_range_total);
                Ok(Probe {
                    content_length: total,
                    ranges: RangeSupport::Bytes,
                })
            }
            200 => Ok(Probe {
                content_length: header_str(&response, CONTENT_LENGTH.as_str())
                    .and_then(|v| v.parse().ok()),
                ranges: RangeSupport::None,
            }),
            _ => Err(TransportError::Http { status }),
        }
    }
}

// =============================================================================
// HttpClient Implementation
// =============================================================================

impl HttpClient for ReqwestClient {
    fn probe(&self, url: &str) -> Result<Probe, TransportError> {
        let response = self.send_with_retry(url, || self.client.head(url))?;
        let status = response.status();

        if status.is_success() {
            let content_length = header_str(&response, CONTENT_LENGTH.as_str())
                .and_then(|v| v.parse::<u64>().ok());
            let ranges = RangeSupport::from_header(header_str(&response, ACCEPT_RANGES.as_str()));

            if content_length.is_some() {
                return Ok(Probe {
                    content_length,
                    ranges,
                });
            }
            debug!(url, "HEAD response has no Content-Length, probing with a ranged GET");
        } else {
            debug!(url, status = status.as_u16(), "HEAD rejected, probing with a ranged GET");
        }

        self.probe_with_range(url)
    }

    fn fetch_range(&self, url: &str, chunk: &Chunk) -> Result<RangeResponse, TransportError> {
        let range = chunk.range_header();
        let response = self.send_with_retry(url, || self.client.get(url).header(RANGE, &range))?;
        let status = response.status().as_u16();

        Ok(RangeResponse::new(status, response))
    }
}

// =============================================================================
// Header Parsing
// =============================================================================

fn header_str<'a>(response: &'a Response, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}

/// Extract the complete length from a `Content-Range` value such as
/// `bytes 0-0/12345`. Returns `None` for an unknown length (`*`).
pub fn parse_content_range_total(value: &str) -> Option<u64> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (_, total) = rest.split_once('/')?;
    total.trim().parse().ok()
}
