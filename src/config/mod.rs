//! Configuration module for DataVis-Ingest
//!
//! This module handles ingestion configuration:
//! - Per-backend settings (see [`settings`])
//! - Loading from JSON or TOML files, chosen by extension
//! - A default config file in the platform data directory
//!
//! # App Data Location
//!
//! The default config lives in the platform-appropriate data directory under
//! `dev.hxyulin.datavis-ingest`:
//! - **Linux**: `~/.local/share/dev.hxyulin.datavis-ingest/ingest.json`
//! - **macOS**: `~/Library/Application Support/dev.hxyulin.datavis-ingest/ingest.json`
//! - **Windows**: `%APPDATA%\dev.hxyulin.datavis-ingest\ingest.json`
//!
//! # Example
//!
//! ```ignore
//! use datavis_ingest::config::IngestConfig;
//!
//! let mut config = IngestConfig::load("ingest.toml")?;
//! config.stream.queue_capacity = 64;
//! config.save("ingest.json")?;
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{IngestError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for data directories
pub const APP_ID: &str = "dev.hxyulin.datavis-ingest";

/// Default config filename
pub const CONFIG_FILE: &str = "ingest.json";

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Get the path to the default config file
pub fn default_config_path() -> Option<PathBuf> {
    app_data_dir().map(|p| p.join(CONFIG_FILE))
}

/// On-disk formats understood by [`IngestConfig::load`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => ConfigFormat::Toml,
            _ => ConfigFormat::Json,
        }
    }
}

/// Complete ingestion configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Streaming sources
    pub stream: StreamConfig,
    /// Delimited-file sources
    pub delimited: DelimitedConfig,
    /// Relational sources
    pub relational: RelationalConfig,
}

impl IngestConfig {
    /// Load a config file, JSON or TOML depending on its extension
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            IngestError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        match ConfigFormat::from_path(path) {
            ConfigFormat::Json => serde_json::from_str(&content).map_err(|e| {
                IngestError::Config(format!("Failed to parse config file {:?}: {}", path, e))
            }),
            ConfigFormat::Toml => toml::from_str(&content).map_err(|e| {
                IngestError::Config(format!("Failed to parse config file {:?}: {}", path, e))
            }),
        }
    }

    /// Load the config from the default location, returning defaults on any error
    pub fn load_or_default() -> Self {
        let Some(path) = default_config_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save the config, JSON or TOML depending on the extension
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    IngestError::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = match ConfigFormat::from_path(path) {
            ConfigFormat::Json => serde_json::to_string_pretty(self)
                .map_err(|e| IngestError::Serialization(e.to_string()))?,
            ConfigFormat::Toml => {
                toml::to_string_pretty(self).map_err(|e| IngestError::Serialization(e.to_string()))?
            }
        };

        std::fs::write(path, content).map_err(|e| {
            IngestError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: IngestConfig =
            serde_json::from_str(r#"{ "stream": { "queue_capacity": 8 } }"#).unwrap();
        assert_eq!(config.stream.queue_capacity, 8);
        assert_eq!(config.stream.retry_budget, 10);
        assert_eq!(config.delimited.missing_marker, "?");
        assert_eq!(config.relational.descr_table, "descr");
    }

    #[test]
    fn test_toml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ingest.toml");

        let mut config = IngestConfig::default();
        config.delimited.delimiter = ';';
        config.stream.read_timeout_ms = 250;
        config.save(&path).unwrap();

        let loaded = IngestConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ingest.json");

        let mut config = IngestConfig::default();
        config.relational.descr_table = "legend".to_string();
        config.save(&path).unwrap();

        assert_eq!(IngestConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_load_missing_file() {
        let err = IngestConfig::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, IngestError::Config(_)));
    }
}
