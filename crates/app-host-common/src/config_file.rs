//! Launcher configuration file for the app-host binary.
//!
//! This module defines structures for the TOML file read at startup:
//! - [`ConfigFile`]: Top-level configuration file structure
//! - [`ZoneEntry`]: Execution zone to spawn
//! - [`ApplicationEntry`]: Application to register

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Top-level configuration file structure.
///
/// # Example
///
/// ```toml
/// host_config = "./config/host.json"
///
/// [[zones]]
/// id = "worker-1"
///
/// [[applications]]
/// module = "example"
/// instances = ["Example", "Example.V1"]
///
/// [[applications]]
/// module = "heavy"
/// instances = ["Heavy"]
/// zone = "worker-1"
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConfigFile {
    /// Host settings document. Built-in defaults are used when absent.
    #[serde(default)]
    pub host_config: Option<String>,

    /// Execution zones to spawn.
    #[serde(default)]
    pub zones: Vec<ZoneEntry>,

    /// Applications to register at startup.
    #[serde(default)]
    pub applications: Vec<ApplicationEntry>,
}

impl ConfigFile {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigFileError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigFileError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string cannot be parsed as TOML.
    pub fn from_toml(content: &str) -> Result<Self, ConfigFileError> {
        toml::from_str(content).map_err(|e| ConfigFileError::Parse {
            message: e.to_string(),
        })
    }
}

/// An execution zone to spawn at startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ZoneEntry {
    /// Unique zone identifier.
    pub id: String,

    /// Host settings for the zone's own engine; defaults to the launcher's.
    #[serde(default)]
    pub host_config: Option<String>,

    /// Capacity of the zone's request channel.
    #[serde(default = "defaults::queue_capacity")]
    pub queue_capacity: usize,
}

/// An application to register at startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApplicationEntry {
    /// Application module name, resolved against the host base directory.
    pub module: String,

    /// Instance names the application is served under.
    pub instances: Vec<String>,

    /// Zone to run the application in. Runs in-process when absent.
    #[serde(default)]
    pub zone: Option<String>,
}

/// Configuration file errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse configuration file.
    #[error("Failed to parse config file: {message}")]
    Parse { message: String },
}

/// Default value functions for serde.
mod defaults {
    pub const fn queue_capacity() -> usize {
        64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_file() {
        let config = ConfigFile::default();

        assert!(config.host_config.is_none());
        assert!(config.zones.is_empty());
        assert!(config.applications.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            host_config = "./config/host.json"

            [[zones]]
            id = "worker-1"

            [[zones]]
            id = "worker-2"
            host_config = "./config/worker.json"
            queue_capacity = 8

            [[applications]]
            module = "example"
            instances = ["Example", "Example.V1"]

            [[applications]]
            module = "heavy"
            instances = ["Heavy"]
            zone = "worker-1"
        "#;

        let config = ConfigFile::from_toml(toml).unwrap();

        assert_eq!(config.host_config.as_deref(), Some("./config/host.json"));
        assert_eq!(config.zones.len(), 2);
        assert_eq!(config.zones[0].queue_capacity, 64);
        assert_eq!(config.zones[1].id, "worker-2");
        assert_eq!(config.zones[1].queue_capacity, 8);
        assert_eq!(config.applications[0].instances, vec!["Example", "Example.V1"]);
        assert!(config.applications[0].zone.is_none());
        assert_eq!(config.applications[1].zone.as_deref(), Some("worker-1"));
    }

    #[test]
    fn test_application_requires_instances() {
        let toml = r#"
            [[applications]]
            module = "example"
        "#;

        assert!(ConfigFile::from_toml(toml).is_err());
    }

    #[test]
    fn test_parse_invalid_toml() {
        let invalid = "this is not valid toml [";
        let result = ConfigFile::from_toml(invalid);
        assert!(result.is_err());
    }
}
