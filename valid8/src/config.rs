//! valid8 configuration types and loading

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::dashboard::{DEFAULT_HISTORY_SIZE, DEFAULT_METRICS_INTERVAL};
use crate::events::DEFAULT_MAX_HISTORY_SIZE;

/// Canonical form of an adapter name: trimmed and lowercased
pub fn normalize_adapter_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Main valid8 configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level override (trace, debug, info, warn, error)
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Adapter registry configuration
    pub manager: ManagerConfig,

    /// Dashboard provider configuration
    pub dashboard: DashboardConfig,

    /// Event bus configuration
    pub events: EventBusConfig,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Rejects duplicate adapter names, a default adapter that names no
    /// configured adapter, and zero-sized history buffers.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for adapter in &self.manager.adapters {
            let name = adapter.normalized_name();
            if name.is_empty() {
                return Err(eyre::eyre!("Adapter names must not be empty"));
            }
            if !seen.insert(name.clone()) {
                return Err(eyre::eyre!("Duplicate adapter name in config: '{}'", name));
            }
        }

        if let Some(default) = &self.manager.default_adapter
            && !seen.contains(&normalize_adapter_name(default))
        {
            return Err(eyre::eyre!(
                "Default adapter '{}' is not among the configured adapters",
                default
            ));
        }

        if self.dashboard.history_size == 0 {
            return Err(eyre::eyre!("dashboard.history-size must be greater than zero"));
        }
        if self.events.max_history_size == 0 {
            return Err(eyre::eyre!("events.max-history-size must be greater than zero"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .valid8.yml
        let local_config = PathBuf::from(".valid8.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/valid8/valid8.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("valid8").join("valid8.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Adapter registry configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Adapter used when no preferred adapter is given
    #[serde(rename = "default-adapter", skip_serializing_if = "Option::is_none")]
    pub default_adapter: Option<String>,

    /// Fall through to other ready adapters by priority
    #[serde(rename = "enable-fallback")]
    pub enable_fallback: bool,

    /// Per-adapter settings, matched to factories by name
    pub adapters: Vec<AdapterConfig>,
}

impl ManagerConfig {
    /// Look up an adapter entry by case-insensitive name
    pub fn adapter(&self, name: &str) -> Option<&AdapterConfig> {
        let name = normalize_adapter_name(name);
        self.adapters.iter().find(|a| a.normalized_name() == name)
    }
}

fn default_enabled() -> bool {
    true
}

/// One adapter entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterConfig {
    pub name: String,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Higher wins during fallback resolution
    #[serde(default)]
    pub priority: i32,

    #[serde(default)]
    pub config: AdapterSettings,
}

impl AdapterConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            priority: 0,
            config: AdapterSettings::default(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.config.extra.insert(key.into(), value.into());
        self
    }

    pub fn normalized_name(&self) -> String {
        normalize_adapter_name(&self.name)
    }
}

/// Opaque per-adapter settings handed to the adapter's factory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterSettings {
    #[serde(rename = "api-key", skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(rename = "api-secret", skip_serializing_if = "Option::is_none")]
    pub api_secret: Option<String>,

    #[serde(rename = "base-url", skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(rename = "timeout-ms", skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Adapter-specific keys
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Dashboard provider configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Recent activity entries kept
    #[serde(rename = "history-size")]
    pub history_size: usize,

    /// Period of `metrics.collected` emission, in milliseconds (0 disables)
    #[serde(rename = "metrics-interval-ms")]
    pub metrics_interval_ms: u64,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            history_size: DEFAULT_HISTORY_SIZE,
            metrics_interval_ms: DEFAULT_METRICS_INTERVAL.as_millis() as u64,
        }
    }
}

/// Event bus configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventBusConfig {
    /// History entries kept per event type
    #[serde(rename = "max-history-size")]
    pub max_history_size: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            max_history_size: DEFAULT_MAX_HISTORY_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!(config.log_level.is_none());
        assert!(config.manager.adapters.is_empty());
        assert!(!config.manager.enable_fallback);
        assert_eq!(config.dashboard.history_size, 100);
        assert_eq!(config.dashboard.metrics_interval_ms, 60_000);
        assert_eq!(config.events.max_history_size, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
log-level: debug
manager:
  default-adapter: Primary
  enable-fallback: true
  adapters:
    - name: primary
      priority: 10
      config:
        api-key: sk_test
        base-url: https://api.example.com
        timeout-ms: 5000
        extra:
          failure-rate: 0.25
    - name: backup
      enabled: false
dashboard:
  history-size: 50
  metrics-interval-ms: 1000
events:
  max-history-size: 200
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert!(config.manager.enable_fallback);
        assert_eq!(config.manager.adapters.len(), 2);

        let primary = config.manager.adapter("PRIMARY").unwrap();
        assert_eq!(primary.priority, 10);
        assert!(primary.enabled);
        assert_eq!(primary.config.api_key.as_deref(), Some("sk_test"));
        assert_eq!(primary.config.timeout_ms, Some(5000));
        assert_eq!(primary.config.extra["failure-rate"], serde_json::json!(0.25));

        let backup = config.manager.adapter("backup").unwrap();
        assert!(!backup.enabled);
        assert_eq!(backup.priority, 0);

        assert_eq!(config.dashboard.history_size, 50);
        assert_eq!(config.events.max_history_size, 200);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
manager:
  enable-fallback: true
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.manager.enable_fallback);
        assert_eq!(config.dashboard, DashboardConfig::default());
        assert_eq!(config.events, EventBusConfig::default());
    }

    #[test]
    fn test_validate_rejects_duplicates_case_insensitively() {
        let mut config = Config::default();
        config.manager.adapters = vec![AdapterConfig::new("Sim"), AdapterConfig::new("sim")];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate adapter name"));
    }

    #[test]
    fn test_validate_rejects_unknown_default() {
        let mut config = Config::default();
        config.manager.adapters = vec![AdapterConfig::new("a")];
        config.manager.default_adapter = Some("b".to_string());
        assert!(config.validate().is_err());

        config.manager.default_adapter = Some("A".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_trims_default_like_adapter_names() {
        let mut config = Config::default();
        config.manager.adapters = vec![AdapterConfig::new("Primary")];
        config.manager.default_adapter = Some(" primary ".to_string());
        assert!(config.validate().is_ok());
        assert!(config.manager.adapter("  PRIMARY").is_some());
    }

    #[test]
    fn test_validate_rejects_zero_sizes() {
        let mut config = Config::default();
        config.dashboard.history_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.events.max_history_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "events:\n  max-history-size: 42").unwrap();

        let config = Config::load(Some(&file.path().to_path_buf())).unwrap();
        assert_eq!(config.events.max_history_size, 42);
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.yml");
        assert!(Config::load(Some(&missing)).is_err());
    }

    #[test]
    fn test_round_trips_through_yaml() {
        let mut config = Config::default();
        config.manager.default_adapter = Some("primary".to_string());
        config.manager.adapters = vec![AdapterConfig::new("primary").with_priority(5).with_setting("latency-ms", 10)];

        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("default-adapter: primary"));
        let back: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, config);
    }
}
