use std::{io, path::PathBuf};

use thiserror::Error;

/// Configuration could not be located, read, parsed or validated.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no config path available (neither XDG_CONFIG_HOME nor HOME is set)")]
    ConfigPathUnavailable,
    #[error("cannot read {path}: {source}")]
    ReadFailed { path: PathBuf, source: io::Error },
    #[error("cannot write {path}: {source}")]
    WriteFailed { path: PathBuf, source: io::Error },
    #[error("cannot parse {path}: {source}")]
    ParseFailed { path: PathBuf, source: toml::de::Error },
    #[error("cannot serialize configuration: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("cannot load env file {path}: {source}")]
    EnvFile { path: PathBuf, source: dotenvy::Error },
    #[error("invalid value for {key}: `{value}`")]
    InvalidOverride { key: &'static str, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error(transparent)]
    Logger(#[from] logger::LoggerError),
}

/// A probe batch could not be attempted at all.
///
/// Packet loss is never reported through this type; a batch with zero
/// replies is a successful batch.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("cannot resolve {host}: {source}")]
    Resolution { host: String, source: io::Error },
    #[error("{host} resolved to no usable address")]
    NoAddress { host: String },
    #[error("cannot open ICMP socket: {0}")]
    Socket(#[source] io::Error),
}

/// A batch record could not be written.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] libsql::Error),
    #[error("cannot acquire database connection: {0}")]
    Pool(#[from] deadpool::managed::PoolError<libsql::Error>),
    #[error("storage I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("unreadable record: {0}")]
    CorruptRow(String),
    #[error("cannot build database pool: {0}")]
    Build(#[from] deadpool::managed::BuildError),
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),
    #[error("cannot create probe for {target}: {reason}")]
    ProbeCreation { target: String, reason: String },
    #[error("network unavailable: {0}")]
    NetworkUnavailable(#[from] ProbeError),
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monitor_errors_keep_their_category() {
        let unavailable = MonitorError::from(ProbeError::NoAddress { host: "example.invalid".into() });
        assert!(unavailable.to_string().starts_with("network unavailable"));

        let persistence = MonitorError::from(PersistenceError::Io(io::Error::other("disk full")));
        assert!(matches!(persistence, MonitorError::Persistence(_)));
        assert!(persistence.to_string().contains("disk full"));

        let config = MonitorError::from(ConfigError::Invalid("count must be positive".into()));
        assert!(config.to_string().starts_with("configuration error"));
    }

    #[test]
    fn messages_name_the_host() {
        let err = ProbeError::Resolution {
            host: "example.invalid".into(),
            source: io::Error::new(io::ErrorKind::NotFound, "no such host"),
        };
        assert!(err.to_string().contains("example.invalid"));
    }
}
