//! Progress accounting for parallel chunk downloads.
//!
//! Workers bump lock-free counters; the orchestrating thread reads them and is
//! the only caller of the user's progress callback, so reported fractions are
//! never out of order.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Receives the fraction of chunks finished, in `[0, 1]`.
pub type ProgressCallback = Arc<dyn Fn(f64) + Send + Sync>;

/// Receives the final outcome: success flag and an optional diagnostic.
pub type CompletionCallback = Arc<dyn Fn(bool, Option<&str>) + Send + Sync>;

/// Shared counters for one download.
#[derive(Debug)]
pub struct ProgressCounters {
    total_chunks: usize,
    /// Bytes written across all chunks, including chunks still in flight.
    bytes_written: AtomicU64,
    /// Chunks that finished, successfully or not.
    completed: AtomicUsize,
}

impl ProgressCounters {
    /// Counters for `num_chunks` chunks.
    pub fn new(num_chunks: usize) -> Self {
        Self {
            total_chunks: num_chunks,
            bytes_written: AtomicU64::new(0),
            completed: AtomicUsize::new(0),
        }
    }

    /// Number of chunks tracked.
    pub fn total_chunks(&self) -> usize {
        self.total_chunks
    }

    /// Record one buffer of `bytes` written to the output.
    pub fn record_write(&self, bytes: u64) {
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    /// Mark one more chunk finished; returns the new completed count.
    pub fn mark_completed(&self) -> usize {
        self.completed.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Number of finished chunks.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// `completed / total`, or 1.0 when there is nothing to download.
    pub fn fraction(&self) -> f64 {
        fraction(self.completed(), self.total_chunks)
    }
}

/// `completed / total` clamped to `[0, 1]`.
pub(crate) fn fraction(completed: usize, total: usize) -> f64 {
    if total == 0 {
        1.0
    } else {
        (completed.min(total) as f64) / (total as f64)
    }
}
