use std::{
    env::var,
    fs::{File, OpenOptions},
    io,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Mutex,
};

use thiserror::Error;
use tracing::{level_filters::LevelFilter, warn};
use tracing_subscriber::{Layer, filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("cannot open log file {path}: {source}")]
    OpenFile { path: PathBuf, source: io::Error },
    #[error("unknown log format `{0}` (expected `compact` or `json`)")]
    UnknownFormat(String),
    #[error("invalid log level `{0}`")]
    InvalidLevel(String),
    #[error("a global subscriber is already installed")]
    AlreadyInitialized,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(LoggerError::UnknownFormat(other.to_string())),
        }
    }
}

/// Where and how log events are written.
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Append-mode log file; stderr when `None`.
    pub file: Option<PathBuf>,
    pub format: LogFormat,
    pub level: LevelFilter,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self { file: None, format: LogFormat::Compact, level: LevelFilter::INFO }
    }
}

impl LogOptions {
    pub fn with_level(mut self, level: &str) -> Result<Self, LoggerError> {
        self.level = level.parse().map_err(|_| LoggerError::InvalidLevel(level.to_string()))?;
        Ok(self)
    }

    /// `RUST_LOG_FORMAT` overrides the configured format when it parses.
    fn effective_format(&self) -> LogFormat {
        var("RUST_LOG_FORMAT")
            .ok()
            .and_then(|raw| {
                raw.parse::<LogFormat>()
                    .inspect_err(|error| {
                        warn!("Ignoring RUST_LOG_FORMAT, falling back to configured format: {error}")
                    })
                    .ok()
            })
            .unwrap_or(self.format)
    }
}

fn open_log_file(path: &Path) -> Result<File, LoggerError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|source| LoggerError::OpenFile { path: path.to_path_buf(), source })?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| LoggerError::OpenFile { path: path.to_path_buf(), source })
}

/// Install the global subscriber described by `options`.
pub fn init(options: &LogOptions) -> Result<(), LoggerError> {
    let env_filter =
        EnvFilter::builder().with_default_directive(options.level.into()).from_env_lossy();
    let format = options.effective_format();

    let log_layer = match (&options.file, format) {
        (Some(path), LogFormat::Json) => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(Mutex::new(open_log_file(path)?))
            .with_filter(env_filter)
            .boxed(),
        (Some(path), LogFormat::Compact) => tracing_subscriber::fmt::layer()
            .compact()
            .with_ansi(false)
            .with_writer(Mutex::new(open_log_file(path)?))
            .with_filter(env_filter)
            .boxed(),
        (None, LogFormat::Json) => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(io::stderr)
            .with_filter(env_filter)
            .boxed(),
        (None, LogFormat::Compact) => tracing_subscriber::fmt::layer()
            .compact()
            .with_writer(io::stderr)
            .with_filter(env_filter)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(log_layer)
        .try_init()
        .map_err(|_| LoggerError::AlreadyInitialized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_formats() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("Compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert_eq!("".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert!(matches!("pretty".parse::<LogFormat>(), Err(LoggerError::UnknownFormat(_))));
    }

    #[test]
    fn level_is_parsed_from_config_string() {
        let options = LogOptions::default().with_level("debug").unwrap();
        assert_eq!(options.level, LevelFilter::DEBUG);
        assert!(LogOptions::default().with_level("loud").is_err());
    }

    #[test]
    fn log_file_is_created_with_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/pingmon.log");
        open_log_file(&path).unwrap();
        assert!(path.exists());
    }
}
