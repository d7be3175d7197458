//! Database configuration

use crate::graph::{GraphError, GraphResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Database configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Snapshot directory (None = in-memory only)
    pub data_path: Option<PathBuf>,
    /// How long a transaction waits for an entity held by another one
    /// (None = wait indefinitely)
    pub lock_timeout_ms: Option<u64>,
    /// gzip level for snapshots, 0-9
    pub compression_level: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_path: None,
            lock_timeout_ms: None,
            compression_level: 6,
        }
    }
}

impl DatabaseConfig {
    pub fn with_data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_path = Some(path.into());
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level;
        self
    }

    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout_ms.map(Duration::from_millis)
    }

    pub fn from_yaml_str(yaml: &str) -> GraphResult<Self> {
        let config: DatabaseConfig =
            serde_yaml::from_str(yaml).map_err(|e| GraphError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> GraphResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn validate(&self) -> GraphResult<()> {
        if self.compression_level > 9 {
            return Err(GraphError::Config(format!(
                "compression_level must be between 0 and 9, got {}",
                self.compression_level
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DatabaseConfig::default();
        assert!(config.data_path.is_none());
        assert!(config.lock_timeout().is_none());
        assert_eq!(config.compression_level, 6);
    }

    #[test]
    fn test_builder() {
        let config = DatabaseConfig::default()
            .with_data_path("/tmp/graph")
            .with_lock_timeout(Duration::from_millis(250))
            .with_compression_level(9);
        assert_eq!(config.data_path, Some(PathBuf::from("/tmp/graph")));
        assert_eq!(config.lock_timeout(), Some(Duration::from_millis(250)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_partial() {
        let config = DatabaseConfig::from_yaml_str("lock_timeout_ms: 500\n").unwrap();
        assert_eq!(config.lock_timeout(), Some(Duration::from_millis(500)));
        assert_eq!(config.compression_level, 6);
    }

    #[test]
    fn test_yaml_rejects_bad_level() {
        let result = DatabaseConfig::from_yaml_str("compression_level: 12\n");
        assert!(matches!(result, Err(GraphError::Config(_))));
    }

    #[test]
    fn test_yaml_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("txgraph.yaml");
        std::fs::write(&path, "data_path: /var/lib/txgraph\ncompression_level: 1\n").unwrap();

        let config = DatabaseConfig::from_yaml_file(&path).unwrap();
        assert_eq!(config.data_path, Some(PathBuf::from("/var/lib/txgraph")));
        assert_eq!(config.compression_level, 1);
    }
}
