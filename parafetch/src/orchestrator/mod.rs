//! Parallel ranged download orchestration.
//!
//! A download moves through a fixed sequence of phases:
//!
//! ```text
//! Probing ──► Partitioning ──► Downloading ──► Finalizing ──► Done
//!    │              │                │              ▲
//!    └──────────────┴────────────────┴──── error ───┘
//! ```
//!
//! Finalizing always runs: the client pool is drained, the output store is
//! closed if it was created, and the completion callback fires exactly once.
//!
//! During Downloading a bounded set of scoped worker threads pulls
//! `(chunk, view)` jobs off a shared queue. Workers report each finished
//! chunk back over a channel; the orchestrating thread is the only one that
//! touches [`DownloadState`] or calls the progress callback.

mod request;
mod state;

pub use request::DownloadSpec;
pub use state::DownloadState;

use std::fmt;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chunk::{check_partition, partition, Chunk};
use crate::config::ErrorPolicy;
use crate::error::{DownloadError, DownloadResult};
use crate::pool::{ClientPool, PoolStats};
use crate::progress::ProgressCounters;
use crate::store::{OutputStore, StoreView};
use crate::transport::{HttpClient, Probe, RangeSupport, ReqwestClient, RetryPolicy};
use crate::worker::{fetch_chunk, ChunkOutcome, WorkerContext};

// =============================================================================
// Phases
// =============================================================================

/// Stage of a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Discovering the resource length.
    Probing,
    /// Splitting the resource and creating the output file.
    Partitioning,
    /// Fetching chunks.
    Downloading,
    /// Releasing resources and reporting the outcome.
    Finalizing,
    /// Finished.
    Done,
}

impl Phase {
    /// Lowercase name used in log output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Probing => "probing",
            Self::Partitioning => "partitioning",
            Self::Downloading => "downloading",
            Self::Finalizing => "finalizing",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Reports
// =============================================================================

/// Summary of a successful download.
#[derive(Debug, Clone)]
pub struct DownloadReport {
    /// Where the output was written.
    pub path: PathBuf,
    /// Bytes written.
    pub total_bytes: u64,
    /// Number of chunks.
    pub chunks: usize,
    /// Number of worker threads used.
    pub workers: usize,
    /// Wall-clock time from start to finish.
    pub elapsed: Duration,
    /// Pool counters after the final drain.
    pub pool: PoolStats,
}

impl DownloadReport {
    /// Average throughput in bytes per second.
    pub fn bytes_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.total_bytes as f64 / secs
        } else {
            0.0
        }
    }
}

/// Completion message sent from a worker to the orchestrating thread.
struct ChunkEvent {
    chunk: Chunk,
    result: DownloadResult<ChunkOutcome>,
}

// =============================================================================
// Downloader
// =============================================================================

/// Runs downloads with clients drawn from a pool.
#[derive(Debug)]
pub struct Downloader<C> {
    pool: ClientPool<C>,
}

impl Downloader<ReqwestClient> {
    /// Production downloader: `reqwest` clients using the download's timeout and
    /// an exponential backoff over its retry budget.
    pub fn with_reqwest(spec: &DownloadSpec) -> Self {
        let timeout = spec.config.timeout;
        let retry = RetryPolicy::from_budget(spec.config.retries);
        Self::new(ClientPool::new(move || {
            ReqwestClient::with_settings(timeout, retry.clone())
        }))
    }
}

impl<C: HttpClient> Downloader<C> {
    /// Downloader that borrows clients from `pool`.
    pub fn new(pool: ClientPool<C>) -> Self {
        Self { pool }
    }

    /// The client pool.
    pub fn pool(&self) -> &ClientPool<C> {
        &self.pool
    }

    /// Download `spec`, stopping early if `cancel` fires.
    ///
    /// The completion callback is invoked exactly once before this returns,
    /// with `(true, None)` on success or `(false, Some(message))` otherwise.
    pub fn run(
        &self,
        spec: &DownloadSpec,
        cancel: &CancellationToken,
    ) -> DownloadResult<DownloadReport> {
        let started = Instant::now();
        info!(url = %spec.url, parts = spec.config.parts, "Starting download");

        let result = self.execute(spec, cancel);

        enter(Phase::Finalizing);
        let drained = self.pool.drain();
        debug!(drained, "Released pooled clients");

        let result = result.map(|mut report| {
            report.elapsed = started.elapsed();
            report.pool = self.pool.stats();
            report
        });

        match &result {
            Ok(report) => {
                info!(
                    path = %report.path.display(),
                    bytes = report.total_bytes,
                    chunks = report.chunks,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "Download complete"
                );
                spec.report_completion(true, None);
            }
            Err(e) => {
                let message = describe(e);
                warn!(url = %spec.url, error = %message, "Download failed");
                spec.report_completion(false, Some(&message));
            }
        }

        enter(Phase::Done);
        result
    }

    fn execute(
        &self,
        spec: &DownloadSpec,
        cancel: &CancellationToken,
    ) -> DownloadResult<DownloadReport> {
        spec.validate()?;
        if cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }

        enter(Phase::Probing);
        let probe = self.probe(&spec.url)?;
        let total = probe.content_length.ok_or_else(|| DownloadError::ProbeFailed {
            url: spec.url.clone(),
            reason: "server did not report a content length".to_string(),
        })?;
        info!(total, ranges = ?probe.ranges, "Probed resource");

        enter(Phase::Partitioning);
        let parts = match probe.ranges {
            RangeSupport::None if spec.config.parts > 1 => {
                warn!("Server does not accept range requests, downloading as a single part");
                1
            }
            _ => spec.config.parts,
        };
        let mut chunks = partition(total, parts)?;
        check_partition(&chunks, total)?;

        let path = spec.output_path();
        let mut store = OutputStore::create(&path, total)?;
        let mut workers = if chunks.is_empty() {
            0
        } else {
            spec.config.worker_count(chunks.len())
        };
        debug!(chunks = chunks.len(), workers, path = %path.display(), "Partitioned resource");

        enter(Phase::Downloading);
        // A server that never mentioned ranges may still ignore them.
        let mut single_part_fallback = probe.ranges == RangeSupport::Unknown && chunks.len() > 1;
        let outcome = loop {
            let state = match store.views(&chunks) {
                Ok(views) => self.download_chunks(
                    spec,
                    total,
                    &chunks,
                    views,
                    workers,
                    single_part_fallback,
                    cancel,
                ),
                Err(e) => break Err(e.into()),
            };

            match state {
                Ok(state)
                    if single_part_fallback
                        && state.only_ranges_ignored()
                        && !cancel.is_cancelled() =>
                {
                    warn!("Server ignored range requests, downloading as a single part");
                    chunks = match partition(total, 1) {
                        Ok(single) => single,
                        Err(e) => break Err(e),
                    };
                    workers = 1;
                    single_part_fallback = false;
                }
                Ok(state) => break settle(state, cancel),
                Err(e) => break Err(e),
            }
        };

        let closed = store.close();
        let total_bytes = match (outcome, closed) {
            (Ok(bytes), Ok(())) => bytes,
            (Ok(_), Err(e)) => return Err(e.into()),
            (Err(e), closed) => {
                if let Err(close_err) = closed {
                    warn!(error = %close_err, "Failed to close output after error");
                }
                return Err(e);
            }
        };

        Ok(DownloadReport {
            path,
            total_bytes,
            chunks: chunks.len(),
            workers,
            elapsed: Duration::ZERO,
            pool: PoolStats::default(),
        })
    }

    fn probe(&self, url: &str) -> DownloadResult<Probe> {
        let failed = |reason: String| DownloadError::ProbeFailed {
            url: url.to_string(),
            reason,
        };

        let client = self.pool.acquire().map_err(|e| failed(e.to_string()))?;
        let probe = client.probe(url).map_err(|e| failed(e.to_string()))?;
        client.release();

        Ok(probe)
    }

    /// Fan the chunks out to workers and fold their results.
    ///
    /// Only a worker that could not be started is an error here; chunk
    /// outcomes are left in the returned state.
    #[allow(clippy::too_many_arguments)]
    fn download_chunks(
        &self,
        spec: &DownloadSpec,
        total: u64,
        chunks: &[Chunk],
        views: Vec<StoreView<'_>>,
        workers: usize,
        single_part_fallback: bool,
        cancel: &CancellationToken,
    ) -> DownloadResult<DownloadState> {
        let mut state = DownloadState::new(chunks.len());
        if chunks.is_empty() {
            spec.report_progress(1.0);
            return Ok(state);
        }

        let counters = ProgressCounters::new(chunks.len());
        let run_cancel = cancel.child_token();
        let ctx = WorkerContext {
            url: &spec.url,
            total_len: total,
            pool: &self.pool,
            counters: &counters,
            cancel: &run_cancel,
        };

        let (work_tx, work_rx) = crossbeam_channel::unbounded();
        for job in chunks.iter().copied().zip(views) {
            if let Err(unsent) = work_tx.send(job) {
                let (chunk, _) = unsent.into_inner();
                warn!(chunk = %chunk, "Work queue closed before every chunk was queued");
                break;
            }
        }
        drop(work_tx);

        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let buffer_size = spec.config.buffer_size;

        let spawned = thread::scope(|scope| {
            let mut spawn_error = None;
            for id in 0..workers {
                let queue = work_rx.clone();
                let events = event_tx.clone();
                let ctx = &ctx;
                let handle = thread::Builder::new()
                    .name(format!("parafetch-worker-{}", id))
                    .spawn_scoped(scope, move || worker_loop(ctx, queue, events, buffer_size));
                if let Err(e) = handle {
                    run_cancel.cancel();
                    spawn_error = Some(e);
                    break;
                }
            }
            drop(event_tx);
            drop(work_rx);

            for event in event_rx.iter() {
                handle_event(
                    spec,
                    &counters,
                    &mut state,
                    &run_cancel,
                    single_part_fallback,
                    event,
                );
            }

            match spawn_error {
                Some(e) => Err(DownloadError::WorkerSpawn(e)),
                None => Ok(()),
            }
        });
        spawned?;

        info!(
            succeeded = state.succeeded,
            failed = state.failed.len(),
            cancelled = state.cancelled,
            bytes = counters.bytes_written(),
            "Chunks finished"
        );

        Ok(state)
    }
}

// =============================================================================
// Chunk Events
// =============================================================================

/// Final result of a finished set of chunks. Cancellation by the caller
/// takes precedence over chunk failures.
fn settle(state: DownloadState, cancel: &CancellationToken) -> DownloadResult<u64> {
    if cancel.is_cancelled() && !state.is_complete() {
        return Err(DownloadError::Cancelled);
    }
    state.into_result()
}

/// Fold one worker report into the download state.
///
/// A failed write to the output stops every chunk whatever the error policy.
/// With `single_part_fallback` set, a server ignoring the range stops the run
/// without counting towards progress, so the caller can start over.
fn handle_event(
    spec: &DownloadSpec,
    counters: &ProgressCounters,
    state: &mut DownloadState,
    run_cancel: &CancellationToken,
    single_part_fallback: bool,
    event: ChunkEvent,
) {
    match event.result {
        Ok(outcome) => {
            state.record_success(outcome.bytes);
            let completed = counters.mark_completed();
            debug!(completed, bytes = counters.bytes_written(), "Progress");
            spec.report_progress(counters.fraction());
        }
        Err(e) if e.is_cancelled() => {
            debug!(chunk = %event.chunk, "Chunk cancelled");
            state.record_cancelled();
        }
        Err(e @ DownloadError::Store(_)) => {
            warn!(chunk = %event.chunk, error = %e, "Cannot write output, cancelling remaining chunks");
            state.record_output_failure(event.chunk.index, e);
            counters.mark_completed();
            spec.report_progress(counters.fraction());
            run_cancel.cancel();
        }
        Err(e @ DownloadError::RangeIgnored { .. }) if single_part_fallback => {
            debug!(chunk = %event.chunk, "Server ignored the range request");
            state.record_failure(event.chunk.index, e);
            run_cancel.cancel();
        }
        Err(e) => {
            warn!(chunk = %event.chunk, error = %e, "Chunk failed");
            state.record_failure(event.chunk.index, e);
            counters.mark_completed();
            spec.report_progress(counters.fraction());

            if spec.config.error_policy == ErrorPolicy::FailFast && !run_cancel.is_cancelled() {
                warn!("Cancelling remaining chunks after failure");
                run_cancel.cancel();
            }
        }
    }
}

/// Body of one worker thread: fetch queued chunks until the queue is empty.
fn worker_loop<C: HttpClient>(
    ctx: &WorkerContext<'_, C>,
    queue: Receiver<(Chunk, StoreView<'_>)>,
    events: Sender<ChunkEvent>,
    buffer_size: usize,
) {
    let mut buffer = vec![0u8; buffer_size];

    for (chunk, mut view) in queue.iter() {
        let result = fetch_chunk(ctx, &chunk, &mut view, &mut buffer);
        if events.send(ChunkEvent { chunk, result }).is_err() {
            break;
        }
    }
}

fn enter(phase: Phase) {
    debug!(phase = %phase, "Entering phase");
}

/// Error text for the completion callback, including the first chunk failure.
fn describe(error: &DownloadError) -> String {
    match error {
        DownloadError::ChunksFailed { first, .. } => format!("{}: {}", error, first),
        other => other.to_string(),
    }
}

// =============================================================================
// Entry Point
// =============================================================================

/// Download `spec` with the production transport.
pub fn download(spec: &DownloadSpec) -> DownloadResult<DownloadReport> {
    Downloader::with_reqwest(spec).run(spec, &CancellationToken::new())
}
