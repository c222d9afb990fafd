//! CLI error types.

use std::error::Error as _;
use std::process::ExitCode;

use parafetch::{ConfigError, DownloadError, LoggingError};
use thiserror::Error;

/// Exit status for an interrupted download, as for SIGINT.
pub const EXIT_CANCELLED: u8 = 130;

/// Errors that end the program.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Config(String),

    #[error(transparent)]
    ConfigFile(#[from] ConfigError),

    #[error(transparent)]
    Logging(#[from] LoggingError),

    #[error("failed to set signal handler: {0}")]
    Signal(String),

    #[error(transparent)]
    Download(#[from] DownloadError),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.exit_status())
    }

    fn exit_status(&self) -> u8 {
        match self {
            CliError::Download(e) if e.is_cancelled() => EXIT_CANCELLED,
            _ => 1,
        }
    }

    /// Print the error and its causes to stderr.
    pub fn report(&self) {
        eprintln!("Error: {}", self);
        let mut source = self.source();
        while let Some(cause) = source {
            eprintln!("  caused by: {}", cause);
            source = cause.source();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_exit_status() {
        let err = CliError::from(DownloadError::Cancelled);
        assert_eq!(err.exit_status(), 130);
    }

    #[test]
    fn test_failure_exit_status() {
        let err = CliError::from(DownloadError::InvalidInput("bad".to_string()));
        assert_eq!(err.exit_status(), 1);
        assert_eq!(CliError::Config("x".to_string()).exit_status(), 1);
    }

    #[test]
    fn test_download_error_is_transparent() {
        let err = CliError::from(DownloadError::Cancelled);
        assert_eq!(err.to_string(), "download cancelled");
    }
}
