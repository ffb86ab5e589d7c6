//! Interface manager configuration types and loading

use std::fs;
use std::path::{Path, PathBuf};

use chrono::TimeDelta;
use eyre::{Context, Result, ensure};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::coordinator::CoordinatorConfig;

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Coordinator and dispatch loop tuning
    pub coordinator: CoordinatorConfig,

    /// Per-interface defaults applied at creation
    pub defaults: InterfaceDefaults,

    /// Diag-disable auto-recovery
    pub recovery: RecoveryConfig,

    /// Log level used when `--log-level` is not given
    pub log_level: Option<String>,
}

/// Defaults consumed when an interface is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct InterfaceDefaults {
    pub admin_enabled: bool,
}

impl Default for InterfaceDefaults {
    fn default() -> Self {
        Self { admin_enabled: true }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RecoveryConfig {
    /// Seconds an interface stays diag-disabled before it is re-enabled;
    /// unset disables auto-recovery
    pub auto_recovery_secs: Option<u64>,
}

impl RecoveryConfig {
    /// Auto-recovery delay, `None` when disabled or too large to represent
    pub fn auto_recovery_delay(&self) -> Option<TimeDelta> {
        let secs = i64::try_from(self.auto_recovery_secs?).ok()?;
        TimeDelta::try_seconds(secs)
    }
}

/// Only the log level, so logging can start before the full load
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct LogLevelOnly {
    log_level: Option<String>,
}

impl Config {
    const LOCAL_FILE: &'static str = ".intfd.yml";

    /// Load configuration with fallback chain
    ///
    /// Explicit path, then `./.intfd.yml`, then
    /// `<config_dir>/intfd/intfd.yml`, then defaults.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        for candidate in Self::candidates() {
            if candidate.exists() {
                match Self::load_from_file(&candidate) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", candidate.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read `log-level` from the first config file found, ignoring errors
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let path = match config_path {
            Some(path) => path.clone(),
            None => Self::candidates().into_iter().find(|p| p.exists())?,
        };
        let content = fs::read_to_string(path).ok()?;
        serde_yaml::from_str::<LogLevelOnly>(&content).ok()?.log_level
    }

    fn candidates() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(Self::LOCAL_FILE)];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("intfd").join("intfd.yml"));
        }
        paths
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        debug!(path = %path.as_ref().display(), "Config::load_from_file: called");
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Reject settings the dispatcher cannot honor
    pub fn validate(&self) -> Result<()> {
        if let Some(secs) = self.recovery.auto_recovery_secs {
            ensure!(
                self.recovery.auto_recovery_delay().is_some(),
                "auto-recovery-secs {} is out of range",
                secs
            );
        }
        Ok(())
    }

    /// Effective configuration as YAML
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config")
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.coordinator.event_timeout_ms, 600_000);
        assert!(config.defaults.admin_enabled);
        assert_eq!(config.recovery.auto_recovery_secs, None);
        assert_eq!(config.log_level, None);
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
coordinator:
  event-timeout-ms: 5000
  correlator-pool-size: 128
  timer-interval-ms: 250

defaults:
  admin-enabled: false

recovery:
  auto-recovery-secs: 300

log-level: debug
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.coordinator.event_timeout_ms, 5000);
        assert_eq!(config.coordinator.correlator_pool_size, 128);
        assert_eq!(config.coordinator.channel_buffer, 1024);
        assert!(!config.defaults.admin_enabled);
        assert_eq!(config.recovery.auto_recovery_secs, Some(300));
        assert_eq!(config.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = serde_yaml::from_str("recovery:\n  auto-recovery-secs: 5\n").unwrap();
        assert_eq!(config.coordinator, CoordinatorConfig::default());
        assert!(config.defaults.admin_enabled);
    }

    #[test]
    fn test_load_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "log-level: warn\ncoordinator:\n  trace-depth: 8").unwrap();
        let path = file.path().to_path_buf();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.coordinator.trace_depth, 8);
        assert_eq!(Config::load_log_level(Some(&path)).as_deref(), Some("warn"));
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let path = PathBuf::from("/nonexistent/intfd.yml");
        assert!(Config::load(Some(&path)).is_err());
        assert_eq!(Config::load_log_level(Some(&path)), None);
    }

    #[test]
    fn test_yaml_roundtrip_keeps_keys_kebab() {
        let yaml = Config::default().to_yaml().unwrap();
        assert!(yaml.contains("event-timeout-ms"));
        assert!(yaml.contains("admin-enabled"));
    }

    #[test]
    fn test_auto_recovery_delay_range() {
        let mut recovery = RecoveryConfig::default();
        assert_eq!(recovery.auto_recovery_delay(), None);

        recovery.auto_recovery_secs = Some(300);
        assert_eq!(recovery.auto_recovery_delay(), Some(TimeDelta::seconds(300)));

        recovery.auto_recovery_secs = Some(u64::MAX);
        assert_eq!(recovery.auto_recovery_delay(), None);
        recovery.auto_recovery_secs = Some(i64::MAX as u64);
        assert_eq!(recovery.auto_recovery_delay(), None);
    }

    #[test]
    fn test_load_rejects_huge_auto_recovery() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "recovery:\n  auto-recovery-secs: {}", u64::MAX).unwrap();
        let path = file.path().to_path_buf();

        let err = Config::load(Some(&path)).unwrap_err();
        assert!(format!("{:#}", err).contains("out of range"));
    }
}
