//! Description of a single download.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;

use crate::config::{DownloadConfig, ErrorPolicy};
use crate::error::{DownloadError, DownloadResult};
use crate::naming::resolve_output_path;
use crate::progress::{CompletionCallback, ProgressCallback};

/// What to download, where to put it and who to tell.
#[derive(Clone)]
pub struct DownloadSpec {
    /// Resource URL (`http` or `https`).
    pub url: String,
    /// Tunables.
    pub config: DownloadConfig,
    /// Output path; derived from the URL when unset.
    pub output: Option<PathBuf>,
    on_progress: Option<ProgressCallback>,
    on_complete: Option<CompletionCallback>,
}

impl DownloadSpec {
    /// Download `url` with the default configuration.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            config: DownloadConfig::default(),
            output: None,
            on_progress: None,
            on_complete: None,
        }
    }

    /// Replace the whole configuration.
    pub fn with_config(mut self, config: DownloadConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_parts(mut self, parts: usize) -> Self {
        self.config.parts = parts;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.config.buffer_size = buffer_size;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.config.retries = retries;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.config.workers = Some(workers);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.config.error_policy = policy;
        self
    }

    /// Write to `path` instead of the name derived from the URL.
    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    /// Called with the fraction of chunks finished after each chunk.
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    /// Called once when the download ends, successfully or not.
    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: Fn(bool, Option<&str>) + Send + Sync + 'static,
    {
        self.on_complete = Some(Arc::new(callback));
        self
    }

    /// Where the output will be written.
    pub fn output_path(&self) -> PathBuf {
        resolve_output_path(&self.url, self.output.as_deref())
    }

    /// Reject unusable parameters before any network traffic.
    pub fn validate(&self) -> DownloadResult<()> {
        if self.config.parts == 0 {
            return Err(DownloadError::InvalidInput(
                "part count must be at least 1".to_string(),
            ));
        }
        if self.config.buffer_size == 0 {
            return Err(DownloadError::InvalidInput(
                "buffer size must be at least 1".to_string(),
            ));
        }
        if self.config.workers == Some(0) {
            return Err(DownloadError::InvalidInput(
                "worker count must be at least 1".to_string(),
            ));
        }

        let url = Url::parse(&self.url)
            .map_err(|e| DownloadError::InvalidInput(format!("invalid URL '{}': {}", self.url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(DownloadError::InvalidInput(format!(
                "unsupported URL scheme '{}'",
                url.scheme()
            )));
        }

        if self.output.as_deref().is_some_and(|p| p.as_os_str().is_empty()) {
            return Err(DownloadError::InvalidInput(
                "output path must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    pub(crate) fn report_progress(&self, fraction: f64) {
        if let Some(callback) = &self.on_progress {
            callback(fraction);
        }
    }

    pub(crate) fn report_completion(&self, success: bool, message: Option<&str>) {
        if let Some(callback) = &self.on_complete {
            callback(success, message);
        }
    }
}

impl fmt::Debug for DownloadSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadSpec")
            .field("url", &self.url)
            .field("config", &self.config)
            .field("output", &self.output)
            .field("on_progress", &self.on_progress.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_builders_update_config() {
        let spec = DownloadSpec::new("https://example.com/a.iso")
            .with_parts(6)
            .with_buffer_size(1024)
            .with_retries(2)
            .with_workers(3)
            .with_timeout(Duration::from_secs(9))
            .with_error_policy(ErrorPolicy::FailFast);

        assert_eq!(spec.config.parts, 6);
        assert_eq!(spec.config.buffer_size, 1024);
        assert_eq!(spec.config.retries, 2);
        assert_eq!(spec.config.workers, Some(3));
        assert_eq!(spec.config.timeout, Duration::from_secs(9));
        assert_eq!(spec.config.error_policy, ErrorPolicy::FailFast);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_output_path_default_and_override() {
        let spec = DownloadSpec::new("https://example.com/dir/a.iso");
        assert_eq!(spec.output_path(), PathBuf::from("a.iso"));

        let spec = spec.with_output("/tmp/b.iso");
        assert_eq!(spec.output_path(), PathBuf::from("/tmp/b.iso"));
    }

    #[test]
    fn test_validate_rejects_bad_input() {
        let url = "https://example.com/a.iso";
        assert!(DownloadSpec::new(url).with_parts(0).validate().is_err());
        assert!(DownloadSpec::new(url).with_buffer_size(0).validate().is_err());
        assert!(DownloadSpec::new(url).with_workers(0).validate().is_err());
        assert!(DownloadSpec::new(url).with_output("").validate().is_err());
        assert!(DownloadSpec::new("not a url").validate().is_err());
        assert!(DownloadSpec::new("ftp://example.com/a.iso").validate().is_err());
    }

    #[test]
    fn test_callbacks_are_invoked() {
        let progress = Arc::new(AtomicUsize::new(0));
        let completions = Arc::new(AtomicUsize::new(0));
        let p = Arc::clone(&progress);
        let c = Arc::clone(&completions);

        let spec = DownloadSpec::new("https://example.com/a.iso")
            .on_progress(move |_| {
                p.fetch_add(1, Ordering::SeqCst);
            })
            .on_complete(move |ok, message| {
                assert!(!ok);
                assert_eq!(message, Some("boom"));
                c.fetch_add(1, Ordering::SeqCst);
            });

        spec.report_progress(0.5);
        spec.report_completion(false, Some("boom"));

        assert_eq!(progress.load(Ordering::SeqCst), 1);
        assert_eq!(completions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_debug_hides_callbacks() {
        let spec = DownloadSpec::new("https://example.com/a.iso").on_progress(|_| {});
        let debug = format!("{:?}", spec);
        assert!(debug.contains("on_progress: true"));
        assert!(debug.contains("on_complete: false"));
    }
}
