//! Configuration settings for casesync.
//!
//! Settings are loaded from `~/.casesync/config.yaml`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cli::args::OutputFormat;
use crate::error::SyncError;
use crate::sync::{Schema, SchemaRegistry};

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// General settings.
    pub general: GeneralConfig,
    /// Server the queue dispatches to.
    pub server: ServerConfig,
    /// Action queue settings.
    pub queue: QueueConfig,
    /// Log output settings.
    pub logging: LoggingConfig,
    /// Merge schemas keyed by collection name.
    pub schemas: BTreeMap<String, Schema>,
    /// Merge schemas keyed by record type (`case`, `incident`, ...).
    pub record_types: BTreeMap<String, Schema>,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Default output format.
    #[serde(default = "default_output_format")]
    pub default_output: OutputFormat,
}

/// Case-management server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL that queued request paths are appended to.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer token sent with every request.
    #[serde(default)]
    pub token: Option<String>,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Action queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Consecutive failures after which the head item is dropped.
    #[serde(default = "default_max_tries")]
    pub max_tries: u32,
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable logs.
    #[serde(default)]
    pub json: bool,
}

const fn default_output_format() -> OutputFormat {
    OutputFormat::Pretty
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

const fn default_timeout() -> u64 {
    30
}

const fn default_max_tries() -> u32 {
    crate::queue::DEFAULT_MAX_TRIES
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            default_output: default_output_format(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: None,
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_tries: default_max_tries(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Config {
    /// Load configuration from a specific path.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load_from_path(path: &std::path::Path) -> Result<Self, SyncError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;

        serde_yaml::from_str(&contents).map_err(|e| {
            SyncError::Config(format!(
                "Failed to parse config file {}: {e}",
                path.display()
            ))
        })
    }

    /// Save configuration to a specific path.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be written.
    pub fn save_to_path(&self, path: &std::path::Path) -> Result<(), SyncError> {
        let contents = serde_yaml::to_string(self)
            .map_err(|e| SyncError::Config(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, contents).map_err(|e| {
            SyncError::Config(format!(
                "Failed to write config file {}: {e}",
                path.display()
            ))
        })
    }

    /// Build the merge schema registry declared by this configuration.
    #[must_use]
    pub fn schema_registry(&self) -> SchemaRegistry {
        let mut registry = SchemaRegistry::default();
        for (collection, schema) in &self.schemas {
            registry.set_collection(collection.clone(), schema.clone());
        }
        for (record_type, schema) in &self.record_types {
            registry.set_record_type(record_type.clone(), schema.clone());
        }
        registry
    }
}
