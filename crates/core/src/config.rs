//! Tracker configuration.
//!
//! Analytics defaults can be kept in a TOML file and loaded with
//! [`TrackerConfig::load_from`]; missing keys fall back to [`Default`].

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Analytics defaults for a [`LogitTracker`](crate::tracking::LogitTracker).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Number of tokens reported per position by `top_tokens_default`.
    pub default_top_k: usize,

    /// Maximum rows per position in a thresholded table export.
    pub table_top_n: usize,

    /// Whether `top_tokens_default` reports raw scores next to probabilities.
    pub include_scores: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            default_top_k: 10,
            table_top_n: 10,
            include_scores: true,
        }
    }
}

impl TrackerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_toml_str(&content)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ConfigError::Io)?;
        }

        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        fs::write(path, content).map_err(ConfigError::Io)?;
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(std::io::Error),
    #[error("Parse error: {0}")]
    Parse(toml::de::Error),
    #[error("Serialize error: {0}")]
    Serialize(toml::ser::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = TrackerConfig::default();
        assert_eq!(config.default_top_k, 10);
        assert_eq!(config.table_top_n, 10);
        assert!(config.include_scores);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("tracker.toml");

        let config = TrackerConfig {
            default_top_k: 3,
            table_top_n: 25,
            include_scores: false,
        };

        config.save_to(&path).unwrap();
        let loaded = TrackerConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config = TrackerConfig::from_toml_str("table_top_n = 4\n").unwrap();
        assert_eq!(config.table_top_n, 4);
        assert_eq!(config.default_top_k, 10);
        assert!(config.include_scores);
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let err = TrackerConfig::from_toml_str("default_top_k = \"many\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let err = TrackerConfig::load_from(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
