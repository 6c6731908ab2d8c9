use crate::constants::*;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables of a cluster: one catalog plus `node_count` storage nodes.
/// Every field has a default, so an empty YAML document is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub node_count: usize,
    pub chunk_size: usize,
    pub replication_factor: usize,
    pub heartbeat_interval_ms: u64,
    pub replication_check_interval_ms: u64,
    pub request_timeout_ms: u64,
    /// Falls back to one heartbeat interval plus a small margin.
    pub shutdown_grace_ms: Option<u64>,
    pub log_level: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        ClusterConfig {
            node_count: DEFAULT_NODE_COUNT,
            chunk_size: DEFAULT_CHUNK_SIZE_B,
            replication_factor: DEFAULT_REPLICATION_FACTOR,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MILLISECONDS,
            replication_check_interval_ms: DEFAULT_REPLICATION_CHECK_INTERVAL_MILLISECONDS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MILLISECONDS,
            shutdown_grace_ms: None,
            log_level: "info".to_string(),
        }
    }
}

impl ClusterConfig {
    pub fn parse_from_file(file_path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(file_path)
            .with_context(|| format!("Failed to read config file '{}'", file_path))?;
        Self::parse_from_str(&content)
    }

    pub fn parse_from_str(content: &str) -> Result<Self> {
        // An empty document deserializes to unit, not to an empty map.
        if content.trim().is_empty() {
            return Ok(ClusterConfig::default());
        }
        serde_yaml::from_str(content).context("Failed to parse YAML configuration")
    }

    ///
    /// Applies `NUM_WORKERS` and `LOGLEVEL` from the environment on top of the loaded values.
    ///
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(workers) = lookup("NUM_WORKERS") {
            self.node_count = workers
                .trim()
                .parse()
                .with_context(|| format!("NUM_WORKERS must be an integer, got '{}'", workers))?;
        }
        if let Some(level) = lookup("LOGLEVEL") {
            self.log_level = level.trim().to_lowercase();
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            bail!("chunk_size must be at least 1 byte");
        }
        if self.replication_factor == 0 {
            bail!("replication_factor must be at least 1");
        }
        if self.heartbeat_interval_ms == 0 || self.replication_check_interval_ms == 0 {
            bail!("Background loop intervals must be non-zero");
        }
        if self.request_timeout_ms == 0 {
            bail!("request_timeout_ms must be non-zero");
        }
        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn replication_check_interval(&self) -> Duration {
        Duration::from_millis(self.replication_check_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms.unwrap_or(
            self.heartbeat_interval_ms + SHUTDOWN_GRACE_EXTRA_MILLISECONDS,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_config_parsing() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("config.yaml");
        let mut file = File::create(&file_path).unwrap();

        writeln!(
            file,
            r#"
node_count: 5
chunk_size: 64
replication_factor: 3
heartbeat_interval_ms: 250
request_timeout_ms: 100
log_level: "debug"
"#
        )
        .unwrap();

        let config = ClusterConfig::parse_from_file(file_path.to_str().unwrap())
            .expect("Failed to parse config file");

        assert_eq!(config.node_count, 5);
        assert_eq!(config.chunk_size, 64);
        assert_eq!(config.replication_factor, 3);
        assert_eq!(config.heartbeat_interval(), Duration::from_millis(250));
        assert_eq!(config.request_timeout(), Duration::from_millis(100));
        // Unspecified fields keep their defaults.
        assert_eq!(
            config.replication_check_interval_ms,
            DEFAULT_REPLICATION_CHECK_INTERVAL_MILLISECONDS
        );
        assert_eq!(config.shutdown_grace(), Duration::from_millis(2250));
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_empty_document_yields_defaults() {
        let config = ClusterConfig::parse_from_str("  \n").unwrap();
        assert_eq!(config, ClusterConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.yaml");
        assert!(ClusterConfig::parse_from_file(missing.to_str().unwrap()).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [("NUM_WORKERS", "7"), ("LOGLEVEL", "WARN")].into();
        let mut config = ClusterConfig::default();
        config
            .apply_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.node_count, 7);
        assert_eq!(config.log_level, "warn");

        let mut config = ClusterConfig::default();
        let result = config.apply_overrides(|name| {
            (name == "NUM_WORKERS").then(|| "many".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = ClusterConfig::default();
        config.chunk_size = 0;
        assert!(config.validate().is_err());

        let mut config = ClusterConfig::default();
        config.replication_factor = 0;
        assert!(config.validate().is_err());

        let mut config = ClusterConfig::default();
        config.heartbeat_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = ClusterConfig::default();
        config.request_timeout_ms = 0;
        assert!(config.validate().is_err());
    }
}
