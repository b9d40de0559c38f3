use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_PING_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_MAX_POINTS: usize = 100;
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not find config directory")]
    NoConfigDir,

    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to save config {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    /// Run the system `ping` utility.
    #[default]
    Command,
    /// Send ICMP echo requests directly.
    Icmp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub backend: ProbeKind,
    pub timeout_secs: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            backend: ProbeKind::Command,
            timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
        }
    }
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub hosts: Vec<String>,
    pub log_file: PathBuf,
    /// Seconds between sampling rounds.
    pub ping_interval: u64,
    /// Samples kept per host for the chart.
    pub max_points: usize,
    pub probe: ProbeConfig,
    /// Flush the log every this many rounds in addition to the flush at exit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub autosave_rounds: Option<u32>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            hosts: vec!["google.com".to_string(), "8.8.8.8".to_string(), "8.8.4.4".to_string()],
            log_file: PathBuf::from("ping_log.csv"),
            ping_interval: DEFAULT_PING_INTERVAL_SECS,
            max_points: DEFAULT_MAX_POINTS,
            probe: ProbeConfig::default(),
            autosave_rounds: None,
        }
    }
}

impl AppConfig {
    pub fn get_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir()
            .ok_or(ConfigError::NoConfigDir)?
            .join("PingLogger");
        Ok(config_dir.join("config.json"))
    }

    /// Loads the config from the default location, falling back to defaults
    /// when it is missing or unusable.
    pub fn load() -> Self {
        let loaded = Self::get_config_path().and_then(|path| {
            if path.exists() {
                Self::load_from(&path).map(Some)
            } else {
                Ok(None)
            }
        });

        match loaded {
            Ok(Some(config)) => config,
            Ok(None) => AppConfig::default(),
            Err(e) => {
                log::warn!("{e}; using default configuration");
                AppConfig::default()
            }
        }
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;
        let write = || -> std::io::Result<()> {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, content)
        };
        write().map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hosts.is_empty() {
            return Err(ConfigError::Invalid("at least one host is required".into()));
        }
        if let Some(index) = self.hosts.iter().position(|h| h.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!("host #{} is empty", index + 1)));
        }
        for (index, host) in self.hosts.iter().enumerate() {
            let host = host.trim();
            if self.hosts[..index].iter().any(|earlier| earlier.trim() == host) {
                return Err(ConfigError::Invalid(format!("host {host} is listed more than once")));
            }
        }
        if self.ping_interval == 0 {
            return Err(ConfigError::Invalid("ping_interval must be at least 1 second".into()));
        }
        if self.max_points == 0 {
            return Err(ConfigError::Invalid("max_points must be at least 1".into()));
        }
        if self.probe.timeout_secs == 0 {
            return Err(ConfigError::Invalid("probe.timeout_secs must be at least 1 second".into()));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.hosts, vec!["google.com", "8.8.8.8", "8.8.4.4"]);
        assert_eq!(config.interval(), Duration::from_secs(5));
        assert_eq!(config.max_points, 100);
        assert_eq!(config.log_file, PathBuf::from("ping_log.csv"));
    }

    #[test]
    fn missing_fields_take_defaults() {
        let raw = r#"{"hosts": ["1.1.1.1"], "probe": {"backend": "icmp"}}"#;
        let config: AppConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.hosts, vec!["1.1.1.1"]);
        assert_eq!(config.ping_interval, DEFAULT_PING_INTERVAL_SECS);
        assert_eq!(config.probe.backend, ProbeKind::Icmp);
        assert_eq!(config.probe.timeout(), Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS));
        assert_eq!(config.autosave_rounds, None);
    }

    #[test]
    fn saved_config_loads_back() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("nested").join("config.json");
        let config = AppConfig {
            hosts: vec!["router.lan".into()],
            max_points: 20,
            autosave_rounds: Some(12),
            ..AppConfig::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(AppConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn explicit_path_must_exist_and_parse() {
        let tmp = tempdir().unwrap();
        let missing = tmp.path().join("missing.json");
        assert!(matches!(AppConfig::load_from(&missing), Err(ConfigError::Read { .. })));

        let broken = tmp.path().join("broken.json");
        fs::write(&broken, "{ hosts: ").unwrap();
        assert!(matches!(AppConfig::load_from(&broken), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn validation_rejects_degenerate_settings() {
        let no_hosts = AppConfig {
            hosts: vec![],
            ..AppConfig::default()
        };
        let blank_host = AppConfig {
            hosts: vec!["a".into(), " ".into()],
            ..AppConfig::default()
        };
        let zero_interval = AppConfig {
            ping_interval: 0,
            ..AppConfig::default()
        };
        let zero_points = AppConfig {
            max_points: 0,
            ..AppConfig::default()
        };
        let repeated_host = AppConfig {
            hosts: vec!["a".into(), "b".into(), " a ".into()],
            ..AppConfig::default()
        };
        let zero_timeout = AppConfig {
            probe: ProbeConfig {
                timeout_secs: 0,
                ..ProbeConfig::default()
            },
            ..AppConfig::default()
        };
        let invalid = [
            no_hosts,
            blank_host,
            repeated_host,
            zero_interval,
            zero_points,
            zero_timeout,
        ];
        for config in invalid {
            assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        }
    }
}
