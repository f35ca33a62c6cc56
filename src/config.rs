//! Server and watcher configuration.
//!
//! Configuration is plain serde data. Every field has a default so a partial
//! JSON document (or none at all) yields a usable config.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// The filter every completion watcher compiles unless overridden.
///
/// `artifact_name` is a scope variable, not text spliced into the query.
pub const FLOW_COMPLETION_QUERY: &str = "SELECT * FROM watch_monitoring(artifact='System.Flow.Completion') \
     WHERE Flow.artifacts_with_results =~ artifact_name";

/// What a watcher does when its handler panics on a row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowFaultPolicy {
    /// End the subscription; the handle reports a fault.
    #[default]
    Terminate,
    /// Log the fault and keep consuming rows.
    Skip,
}

/// Settings for completion watchers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Filter expression compiled once per registration.
    pub query: String,
    /// Behaviour when a handler panics.
    pub row_fault_policy: RowFaultPolicy,
    /// Per-subscription buffer between the monitoring queue and the watcher.
    pub subscription_capacity: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            query: FLOW_COMPLETION_QUERY.to_string(),
            row_fault_policy: RowFaultPolicy::Terminate,
            subscription_capacity: 1024,
        }
    }
}

/// Server-wide configuration handed to every watcher and exposed to its
/// scope as `server_config`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Name used to tag log events.
    pub server_name: String,
    /// Completion watcher settings.
    pub watcher: WatcherConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_name: "flowwatch".to_string(),
            watcher: WatcherConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reads, parses and validates a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Checks field constraints serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.watcher.query.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "watcher.query".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.watcher.subscription_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "watcher.subscription_capacity".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
