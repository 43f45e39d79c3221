use std::time::Duration;
use std::{env, fmt, fs, path};

use logger::{LogFormat, LogOptions};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::monitoring::scheduler::SettingsSource;
use crate::monitoring::types::{Mode, MonitorSettings, ProbeConfig};

/// Largest ICMP payload that fits an IPv4 datagram with headroom
const MAX_PACKET_SIZE: usize = 65_500;
/// Sequence numbers are 16 bit and must stay unique within a batch
const MAX_PACKET_COUNT: u32 = u16::MAX as u32 + 1;
/// Upper bound for batch timeouts and per-packet intervals
const MAX_DURATION: Duration = Duration::from_secs(24 * 3600);
/// Target written into the configuration created on first run
const FIRST_RUN_TARGET: &str = "1.1.1.1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Host probed in both modes unless a mode overrides it; required
    pub target: String,
    /// Tag written into every record
    pub environment: String,
    /// Seconds between batches in standard mode
    pub standard_interval_seconds: u64,
    pub standard: ModeTable,
    pub outage: ModeTable,
    pub logging: Logging,
    pub storage: Storage,
}

/// Per-mode probe parameters; unset fields fall back to the mode's defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModeTable {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packet_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<path::PathBuf>,
    pub format: String,
    pub level: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Storage {
    pub database: path::PathBuf,
}

impl ModeTable {
    fn defaults_for(mode: Mode) -> Self {
        match mode {
            Mode::Standard => Self {
                target: None,
                count: Some(3),
                packet_size: Some(1000),
                interval_ms: Some(1000),
                timeout_seconds: Some(5),
            },
            Mode::Outage => Self {
                target: None,
                count: Some(5),
                packet_size: Some(24),
                interval_ms: Some(3000),
                timeout_seconds: Some(15),
            },
        }
    }

    fn resolve(&self, mode: Mode, default_target: &str) -> ProbeConfig {
        let defaults = Self::defaults_for(mode);
        let pick = |value: Option<u64>, fallback: Option<u64>| value.or(fallback).unwrap_or_default();

        ProbeConfig {
            target: self.target.clone().unwrap_or_else(|| default_target.to_string()),
            count: self.count.or(defaults.count).unwrap_or_default(),
            packet_size: self.packet_size.or(defaults.packet_size).unwrap_or_default(),
            interval: Duration::from_millis(pick(self.interval_ms, defaults.interval_ms)),
            timeout: Duration::from_secs(pick(self.timeout_seconds, defaults.timeout_seconds)),
        }
    }
}

impl Default for Logging {
    fn default() -> Self {
        Self { file: None, format: "compact".into(), level: "info".into() }
    }
}

impl Default for Storage {
    fn default() -> Self {
        Self { database: path::PathBuf::from("pingmon.db") }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target: String::new(),
            environment: "production".into(),
            standard_interval_seconds: 60,
            standard: ModeTable::defaults_for(Mode::Standard),
            outage: ModeTable::defaults_for(Mode::Outage),
            logging: Logging::default(),
            storage: Storage::default(),
        }
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/pingmon/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, ConfigError> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(ConfigError::ConfigPathUnavailable);
    };

    Ok(path.join("pingmon/config.toml"))
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        writeln!(f, "Current Internal Configuration State:")?;
        write_title_1(f, "Monitor")?;
        write_1(f, "Target", &self.target)?;
        write_1(f, "Environment", &self.environment)?;
        write_1(f, "Standard Interval (s)", &self.standard_interval_seconds)?;

        for (title, mode, table) in
            [("Standard Mode", Mode::Standard, &self.standard), ("Outage Mode", Mode::Outage, &self.outage)]
        {
            let probe = table.resolve(mode, &self.target);
            write_title_1(f, title)?;
            write_1(f, "Target", &probe.target)?;
            write_1(f, "Packet Count", &probe.count)?;
            write_1(f, "Packet Size", &probe.packet_size)?;
            write_1(f, "Interval (ms)", &probe.interval.as_millis())?;
            write_1(f, "Timeout (s)", &probe.timeout.as_secs())?;
        }

        write_title_1(f, "Logging")?;
        let destination = self
            .logging
            .file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "stderr".into());
        write_1(f, "Destination", &destination)?;
        write_1(f, "Format", &self.logging.format)?;
        write_1(f, "Level", &self.logging.level)?;

        write_title_1(f, "Storage")?;
        write_1(f, "Database", &self.storage.database.display())?;

        Ok(())
    }
}

impl Config {
    /// Defaults plus a probe target, as written when no file exists yet
    pub fn first_run() -> Self {
        Self { target: FIRST_RUN_TARGET.into(), ..Self::default() }
    }

    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/pingmon/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|source| ConfigError::ReadFailed { path: config_path.clone(), source })?;
            toml::from_str(raw_string.as_str())
                .map_err(|source| ConfigError::ParseFailed { path: config_path, source })
        } else {
            let config = Self::first_run();
            config.write_config(&config_path)?;
            tracing::info!("Wrote default configuration to {}", config_path.display());
            Ok(config)
        }
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), ConfigError> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|source| ConfigError::WriteFailed { path: path.to_path_buf(), source })?;
        }

        fs::write(path, config_str)
            .map_err(|source| ConfigError::WriteFailed { path: path.to_path_buf(), source })
    }

    /// Apply the environment variables understood by earlier deployments:
    /// `SITE`, `DBFILE`, `LOGFILE`, `STDINTERVAL` and `PINGMON_ENV`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(site) = lookup("SITE") {
            self.target = site;
        }
        if let Some(db) = lookup("DBFILE") {
            self.storage.database = db.into();
        }
        if let Some(log) = lookup("LOGFILE") {
            self.logging.file = Some(log.into());
        }
        if let Some(raw) = lookup("STDINTERVAL") {
            self.standard_interval_seconds = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidOverride { key: "STDINTERVAL", value: raw })?;
        }
        if let Some(tag) = lookup("PINGMON_ENV") {
            self.environment = tag;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target.trim().is_empty() {
            return Err(ConfigError::Invalid("target is required".into()));
        }
        for mode in [Mode::Standard, Mode::Outage] {
            let probe = self.probe_config(mode);
            if probe.target.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{mode} target is empty")));
            }
            if probe.count == 0 {
                return Err(ConfigError::Invalid(format!("{mode} packet count must be positive")));
            }
            if probe.count > MAX_PACKET_COUNT {
                return Err(ConfigError::Invalid(format!(
                    "{mode} packet count {} exceeds {MAX_PACKET_COUNT}",
                    probe.count
                )));
            }
            if probe.timeout.is_zero() {
                return Err(ConfigError::Invalid(format!("{mode} timeout must be positive")));
            }
            if probe.timeout > MAX_DURATION || probe.interval > MAX_DURATION {
                return Err(ConfigError::Invalid(format!(
                    "{mode} timeout and interval must not exceed {} seconds",
                    MAX_DURATION.as_secs()
                )));
            }
            if probe.packet_size > MAX_PACKET_SIZE {
                return Err(ConfigError::Invalid(format!(
                    "{mode} packet size {} exceeds {MAX_PACKET_SIZE} bytes",
                    probe.packet_size
                )));
            }
        }
        Ok(())
    }

    pub fn probe_config(&self, mode: Mode) -> ProbeConfig {
        match mode {
            Mode::Standard => self.standard.resolve(mode, &self.target),
            Mode::Outage => self.outage.resolve(mode, &self.target),
        }
    }

    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            standard: self.probe_config(Mode::Standard),
            outage: self.probe_config(Mode::Outage),
            standard_interval: Duration::from_secs(self.standard_interval_seconds),
            environment: self.environment.clone(),
        }
    }

    pub fn log_options(&self) -> Result<LogOptions, ConfigError> {
        let format: LogFormat = self.logging.format.parse()?;
        let options = LogOptions { file: self.logging.file.clone(), format, ..LogOptions::default() }
            .with_level(&self.logging.level)?;
        Ok(options)
    }
}

/// Reads the env file and config file on every load
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    pub config_path: Option<path::PathBuf>,
    /// Explicit env file; `.env` in the working directory is tried otherwise
    pub env_file: Option<path::PathBuf>,
}

impl ConfigLoader {
    fn load_env_file(&self) -> Result<(), ConfigError> {
        let result = match &self.env_file {
            Some(path) => dotenvy::from_path_override(path),
            None => dotenvy::dotenv_override().map(|_| ()),
        };

        match result {
            Ok(()) => Ok(()),
            Err(err) if self.env_file.is_none() && err.not_found() => Ok(()),
            Err(source) => Err(ConfigError::EnvFile {
                path: self.env_file.clone().unwrap_or_else(|| ".env".into()),
                source,
            }),
        }
    }

    /// Load, override from the environment and validate
    pub fn load(&self) -> Result<Config, ConfigError> {
        self.load_env_file()?;

        let mut config = Config::from_config(self.config_path.as_ref())?;
        config.apply_env(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }
}

impl SettingsSource for ConfigLoader {
    fn load(&self) -> Result<MonitorSettings, ConfigError> {
        ConfigLoader::load(self).map(|config| config.monitor_settings())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_match_original_profiles() {
        let config = Config::first_run();
        let standard = config.probe_config(Mode::Standard);
        let outage = config.probe_config(Mode::Outage);

        assert_eq!(standard.count, 3);
        assert_eq!(standard.packet_size, 1000);
        assert_eq!(standard.timeout, Duration::from_secs(5));
        assert_eq!(outage.count, 5);
        assert_eq!(outage.packet_size, 24);
        assert_eq!(outage.interval, Duration::from_secs(3));
        assert_eq!(outage.timeout, Duration::from_secs(15));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_mode_table_keeps_mode_defaults() {
        let config: Config = toml::from_str(
            r#"
            target = "example.com"

            [outage]
            count = 10
            target = "backup.example.com"
            "#,
        )
        .unwrap();

        let outage = config.probe_config(Mode::Outage);
        assert_eq!(outage.count, 10);
        assert_eq!(outage.packet_size, 24);
        assert_eq!(outage.target, "backup.example.com");
        assert_eq!(config.probe_config(Mode::Standard).target, "example.com");
    }

    #[test]
    fn test_missing_file_is_created_with_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/pingmon");

        let config = Config::from_config(Some(&path)).unwrap();
        assert_eq!(config, Config::first_run());
        assert!(config.validate().is_ok());
        assert!(dir.path().join("nested/pingmon.toml").exists());

        let reread = Config::from_config(Some(&path)).unwrap();
        assert_eq!(reread, config);
    }

    #[test]
    fn test_unparseable_file_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "target = [").unwrap();

        assert!(matches!(Config::from_config(Some(&path)), Err(ConfigError::ParseFailed { .. })));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("SITE", "router.lan"),
            ("DBFILE", "/var/lib/pingmon/log.db"),
            ("LOGFILE", "/var/log/pingmon.log"),
            ("STDINTERVAL", "30"),
            ("PINGMON_ENV", "staging"),
        ]);
        let mut config = Config::default();
        config.apply_env(|key| vars.get(key).map(|v| v.to_string())).unwrap();

        assert_eq!(config.target, "router.lan");
        assert_eq!(config.probe_config(Mode::Outage).target, "router.lan");
        assert_eq!(config.storage.database, path::PathBuf::from("/var/lib/pingmon/log.db"));
        assert_eq!(config.logging.file, Some(path::PathBuf::from("/var/log/pingmon.log")));
        assert_eq!(config.monitor_settings().standard_interval, Duration::from_secs(30));
        assert_eq!(config.environment, "staging");
    }

    #[test]
    fn test_bad_interval_override_is_error() {
        let mut config = Config::default();
        let err = config
            .apply_env(|key| (key == "STDINTERVAL").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOverride { key: "STDINTERVAL", .. }));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::first_run();
        config.target = "  ".into();
        assert!(config.validate().is_err());

        let mut config = Config::first_run();
        config.outage.count = Some(0);
        assert!(config.validate().is_err());

        let mut config = Config::first_run();
        config.standard.timeout_seconds = Some(0);
        assert!(config.validate().is_err());

        let mut config = Config::first_run();
        config.standard.packet_size = Some(70_000);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_file_without_target_is_rejected() {
        let config: Config = toml::from_str("environment = \"x\"\n").unwrap();
        assert!(config.target.is_empty());
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        // a mode-level target does not stand in for the required top-level one
        let config: Config = toml::from_str(
            r#"
            [standard]
            target = "example.com"
            [outage]
            target = "example.com"
            "#,
        )
        .unwrap();
        assert!(config.validate().is_err());

        let mut config: Config = toml::from_str("environment = \"x\"\n").unwrap();
        config.apply_env(|key| (key == "SITE").then(|| "router.lan".to_string())).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_count_is_bounded_by_sequence_space() {
        let mut config = Config::first_run();
        config.outage.count = Some(u16::MAX as u32 + 1);
        assert!(config.validate().is_ok());

        config.outage.count = Some(70_000);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_oversized_timeout_and_interval_are_rejected() {
        let mut config = Config::first_run();
        config.standard.timeout_seconds = Some(u64::MAX);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::first_run();
        config.outage.interval_ms = Some(u64::MAX);
        assert!(config.validate().is_err());

        let mut config = Config::first_run();
        config.outage.timeout_seconds = Some(24 * 3600);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_log_options_from_config() {
        let mut config = Config::default();
        config.logging.format = "json".into();
        config.logging.level = "debug".into();
        let options = config.log_options().unwrap();
        assert_eq!(options.format, LogFormat::Json);

        config.logging.format = "fancy".into();
        assert!(config.log_options().is_err());
    }

    #[test]
    fn test_display_lists_both_modes() {
        let rendered = Config::default().to_string();
        assert!(rendered.contains("Standard Mode"));
        assert!(rendered.contains("Outage Mode"));
        assert!(rendered.contains("stderr"));
    }

    #[test]
    fn test_loader_with_explicit_env_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        let env_path = dir.path().join("pingmon.env");
        fs::write(&env_path, "PINGMON_ENV=loader-test\n").unwrap();

        let loader = ConfigLoader { config_path: Some(config_path), env_file: Some(env_path) };
        let config = loader.load().unwrap();
        assert_eq!(config.environment, "loader-test");
    }

    #[test]
    fn test_loader_missing_explicit_env_file_is_error() {
        let dir = tempdir().unwrap();
        let loader = ConfigLoader {
            config_path: Some(dir.path().join("config.toml")),
            env_file: Some(dir.path().join("missing.env")),
        };
        assert!(matches!(loader.load(), Err(ConfigError::EnvFile { .. })));
    }
}
