//! Download configuration.
//!
//! [`DownloadConfig`] holds the tunables shared by the library and the CLI;
//! [`ConfigFile`] loads and saves them as an INI file.

mod file;

pub use file::{config_file_path, ConfigError, ConfigFile, LoggingSettings};

use std::fmt;
use std::str::FromStr;
use std::thread;
use std::time::Duration;

use crate::transport::DEFAULT_TIMEOUT_SECS;

/// Default copy-buffer size in bytes.
pub const DEFAULT_BUFFER_SIZE: usize = 8096;

/// Default number of transport retries per request.
pub const DEFAULT_RETRIES: u32 = 10;

/// What the orchestrator does when a chunk fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Cancel the remaining chunks on the first failure.
    FailFast,

    /// Let every chunk run; fail at the end if any chunk failed.
    #[default]
    ContinueOnError,
}

impl ErrorPolicy {
    /// Name used in config files and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FailFast => "fail-fast",
            Self::ContinueOnError => "continue",
        }
    }
}

impl fmt::Display for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail-fast" | "failfast" | "fail_fast" => Ok(Self::FailFast),
            "continue" | "continue-on-error" | "continue_on_error" => Ok(Self::ContinueOnError),
            other => Err(format!(
                "unknown error policy '{}' (expected 'fail-fast' or 'continue')",
                other
            )),
        }
    }
}

/// Number of processing units, falling back to 1 if unknown.
pub fn available_parallelism() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

/// Tunables for a download.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadConfig {
    /// Number of chunks to split the resource into.
    pub parts: usize,

    /// Copy-buffer size in bytes.
    pub buffer_size: usize,

    /// Transport retries per request (attempts after the first).
    pub retries: u32,

    /// Worker threads; `None` means one per processing unit.
    pub workers: Option<usize>,

    /// Per-request timeout.
    pub timeout: Duration,

    /// Chunk failure handling.
    pub error_policy: ErrorPolicy,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            parts: available_parallelism(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            retries: DEFAULT_RETRIES,
            workers: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            error_policy: ErrorPolicy::default(),
        }
    }
}

impl DownloadConfig {
    /// Set the part count.
    pub fn with_parts(mut self, parts: usize) -> Self {
        self.parts = parts;
        self
    }

    /// Set the copy-buffer size.
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Set the retry budget.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Override the worker count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the chunk failure policy.
    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    /// Worker count for `chunks` chunks: the override or the number of
    /// processing units, never more than there are chunks and never zero.
    pub fn worker_count(&self, chunks: usize) -> usize {
        self.workers
            .unwrap_or_else(available_parallelism)
            .min(chunks)
            .max(1)
    }
}
