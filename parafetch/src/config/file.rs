//! INI configuration file.
//!
//! Every key is optional; unset keys fall back to [`DownloadConfig`]
//! defaults and command-line flags override whatever the file says.
//!
//! ```ini
//! [download]
//! parts = 8
//! buffer_size = 8096
//! retries = 10
//! workers = 4
//! timeout_secs = 300
//! error_policy = continue
//! show_progress = true
//!
//! [logging]
//! level = info
//! file = /tmp/parafetch.log
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, Properties};
use thiserror::Error;

use super::{DownloadConfig, ErrorPolicy};

const DOWNLOAD_SECTION: &str = "download";
const LOGGING_SECTION: &str = "logging";

/// Errors from reading or writing the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    /// The file is not valid INI.
    #[error("failed to parse config: {0}")]
    Parse(String),

    /// A key holds a value of the wrong type.
    #[error("invalid value for {section}.{key}: {reason}")]
    InvalidValue {
        section: String,
        key: String,
        reason: String,
    },

    /// The file could not be written.
    #[error("failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },

    /// No per-user configuration directory on this platform.
    #[error("no configuration directory available")]
    NoConfigDir,
}

/// Default location: `<config dir>/parafetch/config.ini`.
pub fn config_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("parafetch").join("config.ini"))
}

/// `[logging]` section.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoggingSettings {
    /// Default filter directive, e.g. `info` or `parafetch=debug`.
    pub level: Option<String>,
    /// Optional log file in addition to stderr.
    pub file: Option<PathBuf>,
}

/// Parsed configuration file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    pub parts: Option<usize>,
    pub buffer_size: Option<usize>,
    pub retries: Option<u32>,
    pub workers: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub error_policy: Option<ErrorPolicy>,
    pub show_progress: Option<bool>,
    pub logging: LoggingSettings,
}

impl ConfigFile {
    /// Load from the default location; a missing file yields the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        match config_file_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load from `path`; a missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(text) => Self::parse(&text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Parse INI text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let mut config = Self::default();

        if let Some(section) = ini.section(Some(DOWNLOAD_SECTION)) {
            let download = Section::new(DOWNLOAD_SECTION, section);
            config.parts = download.parse("parts")?;
            config.buffer_size = download.parse("buffer_size")?;
            config.retries = download.parse("retries")?;
            config.workers = download.parse("workers")?;
            config.timeout_secs = download.parse("timeout_secs")?;
            config.error_policy = download.parse("error_policy")?;
            config.show_progress = download.parse("show_progress")?;
        }

        if let Some(section) = ini.section(Some(LOGGING_SECTION)) {
            let logging = Section::new(LOGGING_SECTION, section);
            config.logging.level = logging.get("level").map(str::to_string);
            config.logging.file = logging.get("file").map(PathBuf::from);
        }

        Ok(config)
    }

    /// Write to `path`, creating its directory. Unset keys are omitted.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }

        let download = [
            ("parts", self.parts.map(|v| v.to_string())),
            ("buffer_size", self.buffer_size.map(|v| v.to_string())),
            ("retries", self.retries.map(|v| v.to_string())),
            ("workers", self.workers.map(|v| v.to_string())),
            ("timeout_secs", self.timeout_secs.map(|v| v.to_string())),
            ("error_policy", self.error_policy.map(|v| v.to_string())),
            ("show_progress", self.show_progress.map(|v| v.to_string())),
        ];
        let logging = [
            ("level", self.logging.level.clone()),
            ("file", self.logging.file.as_ref().map(|p| p.display().to_string())),
        ];

        let mut ini = Ini::new();
        for (section, entries) in [(DOWNLOAD_SECTION, &download[..]), (LOGGING_SECTION, &logging[..])] {
            for (key, value) in entries {
                if let Some(value) = value {
                    ini.with_section(Some(section)).set(*key, value.as_str());
                }
            }
        }

        ini.write_to_file(path).map_err(write_err)
    }

    /// Save to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = config_file_path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&path)
    }

    /// Apply the file's values over `base`.
    pub fn apply(&self, base: DownloadConfig) -> DownloadConfig {
        DownloadConfig {
            parts: self.parts.unwrap_or(base.parts),
            buffer_size: self.buffer_size.unwrap_or(base.buffer_size),
            retries: self.retries.unwrap_or(base.retries),
            workers: self.workers.or(base.workers),
            timeout: self
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(base.timeout),
            error_policy: self.error_policy.unwrap_or(base.error_policy),
        }
    }
}

/// Typed lookups within one INI section.
struct Section<'a> {
    name: &'static str,
    props: &'a Properties,
}

impl<'a> Section<'a> {
    fn new(name: &'static str, props: &'a Properties) -> Self {
        Self { name, props }
    }

    fn get(&self, key: &str) -> Option<&'a str> {
        self.props.get(key).map(str::trim).filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: ToString,
    {
        self.get(key)
            .map(|raw| {
                raw.parse::<T>().map_err(|e| ConfigError::InvalidValue {
                    section: self.name.to_string(),
                    key: key.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_full_file() {
        let config = ConfigFile::parse(
            "[download]\nparts = 8\nbuffer_size = 16384\nretries = 3\nworkers = 2\n\
             timeout_secs = 45\nerror_policy = fail-fast\nshow_progress = false\n\
             [logging]\nlevel = debug\nfile = /tmp/parafetch.log\n",
        )
        .unwrap();

        assert_eq!(config.parts, Some(8));
        assert_eq!(config.buffer_size, Some(16384));
        assert_eq!(config.retries, Some(3));
        assert_eq!(config.workers, Some(2));
        assert_eq!(config.timeout_secs, Some(45));
        assert_eq!(config.error_policy, Some(ErrorPolicy::FailFast));
        assert_eq!(config.show_progress, Some(false));
        assert_eq!(config.logging.level.as_deref(), Some("debug"));
        assert_eq!(config.logging.file, Some(PathBuf::from("/tmp/parafetch.log")));
    }

    #[test]
    fn test_parse_empty_file() {
        assert_eq!(ConfigFile::parse("").unwrap(), ConfigFile::default());
    }

    #[test]
    fn test_parse_invalid_number() {
        let err = ConfigFile::parse("[download]\nparts = many\n").unwrap_err();
        match err {
            ConfigError::InvalidValue { section, key, .. } => {
                assert_eq!(section, "download");
                assert_eq!(key, "parts");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let dir = tempdir().unwrap();
        let config = ConfigFile::load_from(&dir.path().join("absent.ini")).unwrap();
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sub/config.ini");
        let config = ConfigFile {
            parts: Some(12),
            retries: Some(0),
            error_policy: Some(ErrorPolicy::ContinueOnError),
            logging: LoggingSettings {
                level: Some("warn".to_string()),
                file: None,
            },
            ..Default::default()
        };

        config.save_to(&path).unwrap();
        assert_eq!(ConfigFile::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_apply_overrides_base() {
        let file = ConfigFile {
            parts: Some(3),
            timeout_secs: Some(10),
            ..Default::default()
        };
        let base = DownloadConfig::default().with_retries(7);

        let merged = file.apply(base);
        assert_eq!(merged.parts, 3);
        assert_eq!(merged.timeout, Duration::from_secs(10));
        assert_eq!(merged.retries, 7);
    }
}
