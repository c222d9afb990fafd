//! Effective settings: command line over config file over defaults.

use std::time::Duration;

use parafetch::config::ConfigFile;
use parafetch::logging::DEFAULT_LEVEL;
use parafetch::{DownloadConfig, ErrorPolicy, LogOptions};

use crate::cli::Args;

/// Everything `main` needs after merging all sources.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub download: DownloadConfig,
    pub show_progress: bool,
    pub log: LogOptions,
}

impl Settings {
    /// Merge `args` over `file` over the library defaults.
    pub fn resolve(args: &Args, file: &ConfigFile) -> Self {
        let mut download = file.apply(DownloadConfig::default());

        if let Some(parts) = args.parts {
            download.parts = parts;
        }
        if let Some(buffer_size) = args.buffer_size {
            download.buffer_size = buffer_size;
        }
        if let Some(retries) = args.retries {
            download.retries = retries;
        }
        if let Some(workers) = args.workers {
            download.workers = Some(workers);
        }
        if let Some(secs) = args.timeout {
            download.timeout = Duration::from_secs(secs);
        }
        if args.fail_fast {
            download.error_policy = ErrorPolicy::FailFast;
        }

        let base_level = file.logging.level.as_deref().unwrap_or(DEFAULT_LEVEL);
        let log = LogOptions {
            level: LogOptions::level_for_verbosity(base_level, args.verbose),
            file: args.log_file.clone().or_else(|| file.logging.file.clone()),
            ansi: true,
        };

        Self {
            download,
            show_progress: !args.no_progress && file.show_progress.unwrap_or(true),
            log,
        }
    }
}

/// `file` with the download flags from `args` written over it.
///
/// Only flags that were actually given are stored; everything else keeps the
/// file's value.
pub fn remember(args: &Args, file: &ConfigFile) -> ConfigFile {
    let mut saved = file.clone();
    saved.parts = args.parts.or(file.parts);
    saved.buffer_size = args.buffer_size.or(file.buffer_size);
    saved.retries = args.retries.or(file.retries);
    saved.workers = args.workers.or(file.workers);
    saved.timeout_secs = args.timeout.or(file.timeout_secs);
    if args.fail_fast {
        saved.error_policy = Some(ErrorPolicy::FailFast);
    }
    if args.no_progress {
        saved.show_progress = Some(false);
    }
    if let Some(path) = &args.log_file {
        saved.logging.file = Some(path.clone());
    }
    saved
}
