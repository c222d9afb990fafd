//! Tracing subscriber setup.
//!
//! Events go to stderr and, optionally, to a log file written by a background
//! thread. `RUST_LOG` takes precedence over the configured level.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Level used when neither the options nor `RUST_LOG` say otherwise.
pub const DEFAULT_LEVEL: &str = "warn";

/// Errors from installing the subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The log file path has no file name component.
    #[error("log file path {} has no file name", .0.display())]
    InvalidPath(PathBuf),

    /// The log directory could not be created.
    #[error("failed to create log directory {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },

    /// The level string is not a valid filter directive.
    #[error("invalid log level '{level}': {reason}")]
    InvalidLevel { level: String, reason: String },

    /// A global subscriber is already installed.
    #[error("failed to install subscriber: {0}")]
    Init(String),
}

/// Subscriber options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogOptions {
    /// Filter directive, e.g. `info` or `parafetch=debug,warn`.
    pub level: String,
    /// Also write events to this file.
    pub file: Option<PathBuf>,
    /// Colourise stderr output.
    pub ansi: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            level: DEFAULT_LEVEL.to_string(),
            file: None,
            ansi: true,
        }
    }
}

impl LogOptions {
    /// Level for `-v` repeated `count` times, starting from `base`.
    pub fn level_for_verbosity(base: &str, count: u8) -> String {
        match count {
            0 => base.to_string(),
            1 => "info".to_string(),
            2 => "debug".to_string(),
            _ => "trace".to_string(),
        }
    }
}

/// Install the global subscriber.
///
/// Returns the file writer's guard when a log file is configured; keep it
/// alive until exit so buffered events are flushed.
pub fn init(options: &LogOptions) -> Result<Option<WorkerGuard>, LoggingError> {
    let filter = build_filter(&options.level)?;

    let console_layer = fmt::layer()
        .with_target(true)
        .with_ansi(options.ansi)
        .with_writer(io::stderr);

    let (file_layer, guard) = match &options.file {
        Some(path) => {
            let writer = file_appender(path)?;
            let (non_blocking, guard) = tracing_appender::non_blocking(writer);
            let layer = fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(non_blocking);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))?;

    Ok(guard)
}

/// `RUST_LOG` if set and valid, otherwise `level`.
fn build_filter(level: &str) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(level).map_err(|e| LoggingError::InvalidLevel {
        level: level.to_string(),
        reason: e.to_string(),
    })
}

fn file_appender(path: &Path) -> Result<tracing_appender::rolling::RollingFileAppender, LoggingError> {
    let file_name = path
        .file_name()
        .ok_or_else(|| LoggingError::InvalidPath(path.to_path_buf()))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    fs::create_dir_all(&dir).map_err(|source| LoggingError::CreateDir {
        path: dir.clone(),
        source,
    })?;

    Ok(tracing_appender::rolling::never(dir, file_name))
}
