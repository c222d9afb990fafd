//! Per-download chunk bookkeeping.
//!
//! Only the orchestrating thread touches this state; workers report to it
//! over a channel.

use crate::error::{DownloadError, DownloadResult};

/// Outcome counts for the chunks of one download.
#[derive(Debug)]
pub struct DownloadState {
    /// Total number of chunks.
    pub total_chunks: usize,
    /// Chunks written completely.
    pub succeeded: usize,
    /// Chunks that stopped because of cancellation.
    pub cancelled: usize,
    /// Bytes written by successful chunks.
    pub bytes_written: u64,
    /// Failed chunk indices, in the order the failures arrived.
    pub failed: Vec<usize>,
    /// Failures where the server sent the whole resource instead of a range.
    pub ranges_ignored: usize,
    first_failure: Option<DownloadError>,
    output_failure: Option<DownloadError>,
}

impl DownloadState {
    /// State for `total_chunks` chunks, none finished.
    pub fn new(total_chunks: usize) -> Self {
        Self {
            total_chunks,
            succeeded: 0,
            cancelled: 0,
            bytes_written: 0,
            failed: Vec::new(),
            ranges_ignored: 0,
            first_failure: None,
            output_failure: None,
        }
    }

    /// Record a chunk written completely.
    pub fn record_success(&mut self, bytes: u64) {
        self.succeeded += 1;
        self.bytes_written += bytes;
    }

    /// Record a failed chunk. The first error is kept as the cause.
    pub fn record_failure(&mut self, chunk_index: usize, error: DownloadError) {
        self.failed.push(chunk_index);
        if matches!(error, DownloadError::RangeIgnored { .. }) {
            self.ranges_ignored += 1;
        }
        if self.first_failure.is_none() {
            self.first_failure = Some(error);
        }
    }

    /// Record a chunk stopped by cancellation.
    pub fn record_cancelled(&mut self) {
        self.cancelled += 1;
    }

    /// Record a chunk that could not write to the output file.
    ///
    /// The output as a whole is unusable, so this error wins over any chunk
    /// failure when the state is collapsed.
    pub fn record_output_failure(&mut self, chunk_index: usize, error: DownloadError) {
        self.failed.push(chunk_index);
        if self.output_failure.is_none() {
            self.output_failure = Some(error);
        }
    }

    /// Returns true if nothing was written and every failure was a server
    /// sending the whole resource for a partial range.
    pub fn only_ranges_ignored(&self) -> bool {
        self.succeeded == 0
            && self.ranges_ignored > 0
            && self.ranges_ignored == self.failed.len()
            && self.output_failure.is_none()
    }

    /// Check if every chunk was written.
    pub fn is_complete(&self) -> bool {
        self.succeeded == self.total_chunks
    }

    /// Collapse into the download's result.
    ///
    /// An output failure is returned as is. Chunk failures are reported as
    /// [`DownloadError::ChunksFailed`]; otherwise any chunk that did not
    /// finish means the download was cancelled.
    pub fn into_result(self) -> DownloadResult<u64> {
        if let Some(error) = self.output_failure {
            return Err(error);
        }
        if let Some(first) = self.first_failure {
            return Err(DownloadError::ChunksFailed {
                failed: self.failed.len(),
                total: self.total_chunks,
                first: Box::new(first),
            });
        }
        if self.succeeded < self.total_chunks {
            return Err(DownloadError::Cancelled);
        }
        Ok(self.bytes_written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;
    use std::io;
    use std::path::PathBuf;

    fn chunk_error(index: usize) -> DownloadError {
        DownloadError::ChunkFetchFailed {
            index,
            start: 0,
            end: 10,
            reason: "HTTP status 500".to_string(),
        }
    }

    #[test]
    fn test_download_state_complete() {
        let mut state = DownloadState::new(2);
        state.record_success(10);
        assert!(!state.is_complete());
        state.record_success(5);

        assert!(state.is_complete());
        assert_eq!(state.into_result().unwrap(), 15);
    }

    #[test]
    fn test_download_state_keeps_first_failure() {
        let mut state = DownloadState::new(3);
        state.record_failure(2, chunk_error(2));
        state.record_success(10);
        state.record_failure(0, chunk_error(0));

        assert_eq!(state.failed, vec![2, 0]);
        assert!(!state.only_ranges_ignored());
        match state.into_result().unwrap_err() {
            DownloadError::ChunksFailed { failed, total, first } => {
                assert_eq!(failed, 2);
                assert_eq!(total, 3);
                assert!(matches!(*first, DownloadError::ChunkFetchFailed { index: 2, .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_download_state_cancelled() {
        let mut state = DownloadState::new(3);
        state.record_success(10);
        state.record_cancelled();
        state.record_cancelled();

        assert_eq!(state.succeeded, 1);
        assert!(state.into_result().unwrap_err().is_cancelled());
    }

    #[test]
    fn test_output_failure_wins() {
        let mut state = DownloadState::new(3);
        state.record_failure(0, chunk_error(0));
        state.record_output_failure(
            1,
            DownloadError::Store(StoreError::Flush {
                path: PathBuf::from("out.bin"),
                source: io::Error::new(io::ErrorKind::Other, "disk gone"),
            }),
        );
        state.record_cancelled();

        assert!(matches!(
            state.into_result().unwrap_err(),
            DownloadError::Store(StoreError::Flush { .. })
        ));
    }

    #[test]
    fn test_only_ranges_ignored() {
        let ignored = |index| DownloadError::RangeIgnored {
            index,
            start: 0,
            end: 10,
        };

        let mut state = DownloadState::new(3);
        state.record_failure(0, ignored(0));
        state.record_cancelled();
        state.record_failure(2, ignored(2));
        assert!(state.only_ranges_ignored());
        assert_eq!(state.ranges_ignored, 2);

        state.record_failure(1, chunk_error(1));
        assert!(!state.only_ranges_ignored());

        let mut state = DownloadState::new(2);
        state.record_success(10);
        state.record_failure(1, ignored(1));
        assert!(!state.only_ranges_ignored());
    }

    #[test]
    fn test_download_state_empty() {
        let state = DownloadState::new(0);
        assert!(state.is_complete());
        assert_eq!(state.into_result().unwrap(), 0);
    }
}
