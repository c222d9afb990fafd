//! parafetch - parallel ranged downloads
//!
//! This library fetches disjoint byte ranges of a remote resource concurrently
//! and writes them straight into a pre-sized output file.
//!
//! # Architecture
//!
//! ```text
//! Downloader (orchestrator)
//!         │
//!         ├── HttpClient (trait) ── ReqwestClient + RetryPolicy
//!         │
//!         ├── ClientPool ── PooledClient (scoped handle)
//!         │
//!         ├── partition() ── Chunk
//!         │
//!         ├── OutputStore ── StoreView (one per chunk, disjoint)
//!         │
//!         ├── fetch_chunk (worker, one thread per slot)
//!         │
//!         └── ProgressCounters (atomic fan-in)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use parafetch::DownloadSpec;
//!
//! let spec = DownloadSpec::new("https://example.com/archive.tar.gz")
//!     .with_parts(8)
//!     .on_progress(|fraction| println!("{:.0}%", fraction * 100.0));
//!
//! let report = parafetch::download(&spec)?;
//! println!("wrote {} bytes to {}", report.total_bytes, report.path.display());
//! ```

pub mod chunk;
pub mod config;
pub mod error;
pub mod logging;
pub mod naming;
pub mod orchestrator;
pub mod pool;
pub mod progress;
pub mod store;
pub mod transport;
pub mod worker;

pub use chunk::{check_partition, partition, Chunk};
pub use config::{ConfigError, ConfigFile, DownloadConfig, ErrorPolicy};
pub use error::{DownloadError, DownloadResult};
pub use logging::{LogOptions, LoggingError};
pub use naming::output_name_from_url;
pub use orchestrator::{download, DownloadReport, DownloadSpec, DownloadState, Downloader, Phase};
pub use pool::{ClientPool, PoolStats, PooledClient};
pub use progress::{CompletionCallback, ProgressCallback, ProgressCounters};
pub use store::{OutputStore, StoreError, StoreView};
pub use transport::{
    HttpClient, Probe, RangeResponse, RangeSupport, ReqwestClient, RetryPolicy, TransportError,
};

/// Re-exported so callers can cancel a download without depending on tokio-util.
pub use tokio_util::sync::CancellationToken;
