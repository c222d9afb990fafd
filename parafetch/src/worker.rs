//! Fetch worker: one ranged GET streamed into one store view.

use std::io::{self, Read};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::chunk::Chunk;
use crate::error::{DownloadError, DownloadResult};
use crate::pool::ClientPool;
use crate::progress::ProgressCounters;
use crate::store::StoreView;
use crate::transport::HttpClient;

/// Everything a worker shares with the other workers of one download.
pub struct WorkerContext<'a, C> {
    /// Resource URL.
    pub url: &'a str,
    /// Total length of the resource.
    pub total_len: u64,
    /// Client pool shared by all workers.
    pub pool: &'a ClientPool<C>,
    /// Shared progress counters.
    pub counters: &'a ProgressCounters,
    /// Cancellation signal checked before acquiring and before each read.
    pub cancel: &'a CancellationToken,
}

/// Result of a successfully fetched chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkOutcome {
    /// Bytes written into the view.
    pub bytes: u64,
    /// Number of buffer writes.
    pub ticks: u64,
}

enum FillError {
    Cancelled,
    Io(io::Error),
}

/// Download `chunk` into `view`, using `buffer` as the copy buffer.
///
/// The body is read into `buffer` until it is full or the stream ends, then
/// the filled part is written in one go. A body that is shorter or longer
/// than the chunk fails the chunk. A write the operating system refuses is
/// returned as [`DownloadError::Store`]. Once every byte is written the view
/// is synced and closed. The pooled client is returned on every path,
/// including failures.
pub fn fetch_chunk<C: HttpClient>(
    ctx: &WorkerContext<'_, C>,
    chunk: &Chunk,
    view: &mut StoreView<'_>,
    buffer: &mut [u8],
) -> DownloadResult<ChunkOutcome> {
    let failed = |reason: String| DownloadError::ChunkFetchFailed {
        index: chunk.index,
        start: chunk.start,
        end: chunk.end,
        reason,
    };

    if buffer.is_empty() {
        return Err(DownloadError::InvalidInput(
            "copy buffer must not be empty".to_string(),
        ));
    }
    if view.len() != chunk.len() || view.offset() != chunk.start {
        return Err(DownloadError::InvalidInput(format!(
            "view at {} of {} bytes does not match chunk {}",
            view.offset(),
            view.len(),
            chunk
        )));
    }

    if ctx.cancel.is_cancelled() {
        return Err(DownloadError::Cancelled);
    }

    let client = ctx
        .pool
        .acquire()
        .map_err(|e| failed(format!("no client available: {}", e)))?;

    debug!(chunk = %chunk, range = %chunk.range_header(), "Fetching chunk");

    let mut response = client
        .fetch_range(ctx.url, chunk)
        .map_err(|e| failed(e.to_string()))?;

    let whole_resource = chunk.start == 0 && chunk.end == ctx.total_len;
    match response.status {
        206 => {}
        200 if whole_resource => {}
        200 => {
            return Err(DownloadError::RangeIgnored {
                index: chunk.index,
                start: chunk.start,
                end: chunk.end,
            })
        }
        status => return Err(failed(format!("HTTP status {}", status))),
    }

    let mut outcome = ChunkOutcome { bytes: 0, ticks: 0 };

    loop {
        let filled = match fill_buffer(&mut response.body, buffer, ctx.cancel) {
            Ok(n) => n,
            Err(FillError::Cancelled) => return Err(DownloadError::Cancelled),
            Err(FillError::Io(e)) => return Err(failed(format!("read error: {}", e))),
        };

        if filled == 0 {
            break;
        }

        view.write(&buffer[..filled]).map_err(|e| match e {
            e if e.is_io() => DownloadError::Store(e),
            e => failed(e.to_string()),
        })?;

        outcome.bytes += filled as u64;
        outcome.ticks += 1;
        ctx.counters.record_write(filled as u64);
    }

    if view.remaining() > 0 {
        return Err(failed(format!(
            "short body: got {} of {} bytes",
            view.written(),
            view.len()
        )));
    }

    client.release();
    view.finish()?;
    debug!(chunk = %chunk, bytes = outcome.bytes, ticks = outcome.ticks, "Chunk complete");

    Ok(outcome)
}

/// Read until `buffer` is full or the stream ends.
///
/// Returns the number of bytes placed in `buffer`; zero means end of stream.
fn fill_buffer(
    body: &mut dyn Read,
    buffer: &mut [u8],
    cancel: &CancellationToken,
) -> Result<usize, FillError> {
    let mut filled = 0;

    while filled < buffer.len() {
        if cancel.is_cancelled() {
            return Err(FillError::Cancelled);
        }
        match body.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(FillError::Io(e)),
        }
    }

    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{OutputStore, StoreError};
    use crate::transport::{Probe, RangeResponse, RangeSupport, TransportError};
    use std::io::Cursor;
    use tempfile::tempdir;

    /// Reader that yields at most `step` bytes per call.
    struct Trickle {
        data: Cursor<Vec<u8>>,
        step: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(self.step);
            self.data.read(&mut buf[..n])
        }
    }

    /// Serves `content`, answering ranged requests in small pieces.
    #[derive(Clone)]
    struct StaticClient {
        content: Vec<u8>,
        status: u16,
        step: usize,
        extra: usize,
    }

    impl StaticClient {
        fn new(content: &[u8]) -> Self {
            Self {
                content: content.to_vec(),
                status: 206,
                step: 3,
                extra: 0,
            }
        }
    }

    impl HttpClient for StaticClient {
        fn probe(&self, _url: &str) -> Result<Probe, TransportError> {
            Ok(Probe {
                content_length: Some(self.content.len() as u64),
                ranges: RangeSupport::Bytes,
            })
        }

        fn fetch_range(&self, _url: &str, chunk: &Chunk) -> Result<RangeResponse, TransportError> {
            let end = (chunk.end as usize + self.extra).min(self.content.len());
            let body = self.content[chunk.start as usize..end].to_vec();
            Ok(RangeResponse::new(
                self.status,
                Trickle {
                    data: Cursor::new(body),
                    step: self.step,
                },
            ))
        }
    }

    fn run(
        client: StaticClient,
        chunk: Chunk,
        buffer_size: usize,
        cancel: &CancellationToken,
    ) -> (DownloadResult<ChunkOutcome>, Vec<u8>, usize) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let total = client.content.len() as u64;
        let pool = ClientPool::new(move || Ok(client.clone()));
        let counters = ProgressCounters::new(chunk.index + 1);
        let ctx = WorkerContext {
            url: "http://example.com/file",
            total_len: total,
            pool: &pool,
            counters: &counters,
            cancel,
        };

        let mut store = OutputStore::create(&path, total).unwrap();
        let result = {
            let mut view = store.view(chunk.start, chunk.len()).unwrap();
            let mut buffer = vec![0u8; buffer_size];
            fetch_chunk(&ctx, &chunk, &mut view, &mut buffer)
        };
        store.close().unwrap();

        let stats = pool.stats();
        assert_eq!(stats.acquired, stats.released, "client not released");
        (result, std::fs::read(&path).unwrap(), stats.acquired)
    }

    #[test]
    fn test_fetch_chunk_writes_at_offset() {
        let chunk = Chunk::new(1, 5, 10);
        let (result, bytes, _) = run(
            StaticClient::new(b"HelloWorld"),
            chunk,
            4,
            &CancellationToken::new(),
        );

        let outcome = result.unwrap();
        assert_eq!(outcome.bytes, 5);
        // 5 bytes through a 4-byte buffer: one full write, one partial.
        assert_eq!(outcome.ticks, 2);
        assert_eq!(&bytes, b"\0\0\0\0\0World");
    }

    #[test]
    fn test_short_reads_are_accumulated() {
        let chunk = Chunk::new(0, 0, 10);
        let mut client = StaticClient::new(b"0123456789");
        client.step = 1;
        let (result, bytes, _) = run(client, chunk, 10, &CancellationToken::new());

        assert_eq!(result.unwrap().ticks, 1);
        assert_eq!(&bytes, b"0123456789");
    }

    #[test]
    fn test_non_success_status_skips_write() {
        let mut client = StaticClient::new(b"HelloWorld");
        client.status = 503;
        let (result, bytes, acquired) =
            run(client, Chunk::new(0, 0, 5), 4, &CancellationToken::new());

        let err = result.unwrap_err();
        assert!(err.to_string().contains("HTTP status 503"));
        assert_eq!(acquired, 1);
        assert_eq!(bytes, vec![0u8; 10]);
    }

    #[test]
    fn test_status_200_accepted_for_whole_resource_only() {
        let mut client = StaticClient::new(b"HelloWorld");
        client.status = 200;
        let (result, _, _) = run(client, Chunk::new(0, 0, 10), 4, &CancellationToken::new());
        assert!(result.is_ok());

        let mut client = StaticClient::new(b"HelloWorld");
        client.status = 200;
        let (result, _, _) = run(client, Chunk::new(0, 0, 5), 4, &CancellationToken::new());
        let err = result.unwrap_err();
        assert!(matches!(err, DownloadError::RangeIgnored { index: 0, start: 0, end: 5 }));
        assert!(err.to_string().contains("ignored the range"));
    }

    #[test]
    fn test_long_body_fails_chunk() {
        let mut client = StaticClient::new(b"HelloWorld");
        client.extra = 2;
        let (result, _, _) = run(client, Chunk::new(0, 0, 5), 4, &CancellationToken::new());
        assert!(matches!(
            result.unwrap_err(),
            DownloadError::ChunkFetchFailed { index: 0, .. }
        ));
    }

    #[test]
    fn test_cancelled_before_acquire() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (result, bytes, acquired) =
            run(StaticClient::new(b"HelloWorld"), Chunk::new(0, 0, 10), 4, &cancel);

        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(acquired, 0);
        assert_eq!(bytes, vec![0u8; 10]);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_full_disk_is_a_store_error() {
        let client = StaticClient::new(b"HelloWorld");
        let pool = ClientPool::new(move || Ok(client.clone()));
        let counters = ProgressCounters::new(1);
        let cancel = CancellationToken::new();
        let ctx = WorkerContext {
            url: "http://example.com/file",
            total_len: 10,
            pool: &pool,
            counters: &counters,
            cancel: &cancel,
        };
        let chunk = Chunk::new(0, 0, 10);
        let mut view = StoreView::new(std::path::Path::new("/dev/full"), 0, 10);
        let mut buffer = vec![0u8; 4];

        let err = fetch_chunk(&ctx, &chunk, &mut view, &mut buffer).unwrap_err();

        assert!(matches!(err, DownloadError::Store(StoreError::Write { .. })));
        assert_eq!(counters.bytes_written(), 0);
        let stats = pool.stats();
        assert_eq!(stats.acquired, stats.released);
    }

    #[test]
    fn test_fill_buffer_stops_at_end_of_stream() {
        let mut body = Cursor::new(b"abc".to_vec());
        let mut buffer = [0u8; 8];
        let cancel = CancellationToken::new();

        assert!(matches!(fill_buffer(&mut body, &mut buffer, &cancel), Ok(3)));
        assert!(matches!(fill_buffer(&mut body, &mut buffer, &cancel), Ok(0)));
    }
}
