//! Error types for download orchestration.

use std::io;

use thiserror::Error;

use crate::store::StoreError;

/// Result type for download operations.
pub type DownloadResult<T> = Result<T, DownloadError>;

/// Errors that can occur while downloading a resource.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Bad part count, buffer size, URL or chunk layout.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The remote length could not be discovered.
    #[error("failed to probe {url}: {reason}")]
    ProbeFailed { url: String, reason: String },

    /// A single chunk failed after the transport exhausted its retries.
    #[error("chunk {index} (bytes {start}..{end}) failed: {reason}")]
    ChunkFetchFailed {
        index: usize,
        start: u64,
        end: u64,
        reason: String,
    },

    /// The server answered a partial range with the whole resource.
    #[error("chunk {index} (bytes {start}..{end}) failed: server ignored the range request (status 200)")]
    RangeIgnored { index: usize, start: u64, end: u64 },

    /// One or more chunks failed; `first` is the earliest failure observed.
    #[error("{failed} of {total} chunks failed")]
    ChunksFailed {
        failed: usize,
        total: usize,
        #[source]
        first: Box<DownloadError>,
    },

    /// The output file could not be created, sized, written or synced.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The download was cancelled before every chunk finished.
    #[error("download cancelled")]
    Cancelled,

    /// A worker thread could not be started.
    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(#[source] io::Error),
}

impl DownloadError {
    /// Returns true if this error is the result of cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_chunk_fetch_failed_display() {
        let err = DownloadError::ChunkFetchFailed {
            index: 2,
            start: 666,
            end: 1000,
            reason: "HTTP status 503".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "chunk 2 (bytes 666..1000) failed: HTTP status 503"
        );
    }

    #[test]
    fn test_chunks_failed_exposes_first_as_source() {
        let err = DownloadError::ChunksFailed {
            failed: 1,
            total: 4,
            first: Box::new(DownloadError::ChunkFetchFailed {
                index: 0,
                start: 0,
                end: 10,
                reason: "short body".to_string(),
            }),
        };
        assert_eq!(err.to_string(), "1 of 4 chunks failed");
        let source = err.source().expect("source");
        assert!(source.to_string().contains("short body"));
    }

    #[test]
    fn test_is_cancelled() {
        assert!(DownloadError::Cancelled.is_cancelled());
        assert!(!DownloadError::InvalidInput("x".into()).is_cancelled());
    }
}
