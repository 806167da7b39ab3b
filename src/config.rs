//! Configuration management for opslog

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::buffer::BufferDefaults;
use crate::error::Error;
use crate::record::Resource;
use crate::severity::Severity;
use crate::sink::{FileSink, Sink, StdoutSink};

/// Environment variable that overrides the config file location
pub const CONFIG_PATH_ENV: &str = "OPSLOG_CONFIG";

/// Upper bound for `diagnostics.retention_days` (one hundred years)
pub const MAX_RETENTION_DAYS: u64 = 36_500;

/// Where flushed records are written
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SinkConfig {
    /// One record per line on standard output
    #[default]
    Stdout,
    /// One record per line appended to a file
    File {
        #[serde(default)]
        path: PathBuf,
    },
}

impl SinkConfig {
    /// Open the configured sink
    pub fn build(&self) -> crate::error::Result<Arc<dyn Sink>> {
        match self {
            SinkConfig::Stdout => Ok(Arc::new(StdoutSink)),
            SinkConfig::File { path } => Ok(Arc::new(FileSink::open(path)?)),
        }
    }
}

/// Settings for the library's own diagnostic output (not the records)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// Directory for diagnostic log files; stderr when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Diagnostic log retention in days (default: 7)
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            retention_days: default_retention_days(),
        }
    }
}

/// Timings for the demo workers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoConfig {
    /// Pause between worker rounds in seconds (default: 10)
    #[serde(default = "default_round_interval")]
    pub round_interval_secs: u64,

    /// Timeout/deadline given to each expiring scope in seconds (default: 2)
    #[serde(default = "default_scope_expiry")]
    pub scope_expiry_secs: u64,

    /// How long each expiring worker keeps working in seconds (default: 3)
    #[serde(default = "default_work_duration")]
    pub work_duration_secs: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            round_interval_secs: default_round_interval(),
            scope_expiry_secs: default_scope_expiry(),
            work_duration_secs: default_work_duration(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Severity used for plain appends and empty scopes (default: INFO)
    #[serde(default)]
    pub default_severity: Severity,

    /// Log name stamped on every record unless a scope overrides it
    #[serde(default = "default_log_name")]
    pub log_name: String,

    /// Labels copied into every record
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    /// Monitored resource descriptor
    #[serde(default)]
    pub resource: Resource,

    #[serde(default)]
    pub sink: SinkConfig,

    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,

    #[serde(default)]
    pub demo: DemoConfig,
}

fn default_log_name() -> String {
    "opslog".to_string()
}

fn default_retention_days() -> u64 {
    7
}

fn default_round_interval() -> u64 {
    10
}

fn default_scope_expiry() -> u64 {
    2
}

fn default_work_duration() -> u64 {
    3
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_severity: Severity::default(),
            log_name: default_log_name(),
            labels: BTreeMap::new(),
            resource: Resource::default(),
            sink: SinkConfig::default(),
            diagnostics: DiagnosticsConfig::default(),
            demo: DemoConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, or defaults if absent
    ///
    /// `OPSLOG_CONFIG` takes precedence over `~/.opslog/config.toml`.
    pub fn load() -> Result<Self> {
        let path = std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(config_file_path);
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load and validate configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Semantic checks that serde cannot express
    pub fn validate(&self) -> std::result::Result<(), Error> {
        if self.log_name.trim().is_empty() {
            return Err(Error::Config("log_name must not be empty".to_string()));
        }
        if self.resource.kind.trim().is_empty() {
            return Err(Error::Config("resource.type must not be empty".to_string()));
        }
        if let SinkConfig::File { path } = &self.sink {
            if path.as_os_str().is_empty() {
                return Err(Error::Config("sink.path is required for file sinks".to_string()));
            }
        }
        if self.diagnostics.retention_days > MAX_RETENTION_DAYS {
            return Err(Error::Config(format!(
                "diagnostics.retention_days must be at most {}",
                MAX_RETENTION_DAYS
            )));
        }
        Ok(())
    }

    /// Metadata each new scope buffer starts from
    pub fn buffer_defaults(&self) -> BufferDefaults {
        BufferDefaults {
            default_severity: self.default_severity,
            log_name: self.log_name.clone(),
            resource: self.resource.clone(),
            labels: self.labels.clone(),
        }
    }
}

/// Get the base configuration directory (~/.opslog)
/// Falls back to ./.opslog if home directory cannot be determined
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".opslog"))
        .unwrap_or_else(|| {
            tracing::warn!("Could not determine home directory, using current directory for config");
            PathBuf::from(".opslog")
        })
}

/// Get the path to the config file
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.default_severity, Severity::Info);
        assert_eq!(config.log_name, "opslog");
        assert_eq!(config.resource.kind, "global");
        assert_eq!(config.sink, SinkConfig::Stdout);
        assert_eq!(config.diagnostics.retention_days, 7);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let mut config = Config::default();
        config.default_severity = Severity::Warning;
        config.labels.insert("env".to_string(), "prod".to_string());

        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_severity, Severity::Warning);
        assert_eq!(parsed.labels.get("env").map(String::as_str), Some("prod"));
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let parsed: Config = toml::from_str("").unwrap();
        assert_eq!(parsed.log_name, "opslog");
        assert_eq!(parsed.demo.scope_expiry_secs, 2);
    }

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
            default_severity = "WARNING"
            log_name = "projects/demo/logs/requests"

            [labels]
            service = "checkout"

            [resource]
            type = "k8s_container"
            labels = { cluster = "blue" }

            [sink]
            kind = "file"
            path = "/var/log/opslog/records.jsonl"

            [diagnostics]
            retention_days = 3
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.default_severity, Severity::Warning);
        assert_eq!(config.log_name, "projects/demo/logs/requests");
        assert_eq!(config.resource.kind, "k8s_container");
        assert_eq!(
            config.resource.labels.get("cluster").map(String::as_str),
            Some("blue")
        );
        assert_eq!(
            config.sink,
            SinkConfig::File {
                path: PathBuf::from("/var/log/opslog/records.jsonl")
            }
        );
        assert_eq!(config.diagnostics.retention_days, 3);

        let defaults = config.buffer_defaults();
        assert_eq!(defaults.labels.get("service").map(String::as_str), Some("checkout"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.log_name = "  ".to_string();
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = Config::default();
        config.resource.kind = String::new();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.sink = SinkConfig::File {
            path: PathBuf::new(),
        };
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.diagnostics.retention_days = MAX_RETENTION_DAYS;
        assert!(config.validate().is_ok());
        config.diagnostics.retention_days = MAX_RETENTION_DAYS + 1;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_load_from_rejects_huge_retention() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[diagnostics]\nretention_days = 18446744073709551\n").unwrap();

        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_load_from_and_save_to() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        let mut config = Config::default();
        config.log_name = "jobs".to_string();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.log_name, "jobs");
    }

    #[test]
    fn test_load_from_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "log_name = \"\"").unwrap();

        assert!(Config::load_from(&path).is_err());
        assert!(Config::load_from(&temp_dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_file_sink_config_builds() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("records.jsonl");
        let sink = SinkConfig::File { path: path.clone() }.build().unwrap();

        sink.write_line(b"{}\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}\n");
    }

    #[test]
    fn test_config_dir_does_not_panic() {
        let dir = config_dir();
        assert!(dir.ends_with(".opslog"));
        assert!(config_file_path().ends_with("config.toml"));
    }
}
