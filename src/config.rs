//! Daemon configuration file parsing.
//!
//! Parses the TOML bootstrap configuration for the discovery daemon.

use crate::method::DiscoveryMethod;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Daemon configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    /// Persistent store settings
    pub store: StoreConfig,

    /// Discovery settings
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

/// Persistent store settings
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Path of the JSON store document
    pub path: PathBuf,
}

/// Discovery settings
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    /// Config-storm protection window in seconds
    #[serde(default = "default_storm_delay")]
    pub storm_delay_secs: u64,

    /// Enabled methods to install into the store at startup; omitted
    /// means keep whatever the store has
    #[serde(default)]
    pub methods: Option<Vec<DiscoveryMethod>>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            storm_delay_secs: default_storm_delay(),
            methods: None,
        }
    }
}

fn default_storm_delay() -> u64 {
    60
}

impl DaemonConfig {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: DaemonConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(methods) = &self.discovery.methods {
            let mut seen = std::collections::HashSet::new();
            for method in methods {
                if !seen.insert(*method) {
                    return Err(ConfigError::Invalid(format!(
                        "duplicate discovery method: {}",
                        method
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let config_str = r#"
[store]
path = "/etc/iscsi/initiator.json"
"#;

        let config = DaemonConfig::parse(config_str).unwrap();
        assert_eq!(config.store.path, PathBuf::from("/etc/iscsi/initiator.json"));
        assert_eq!(config.discovery.storm_delay_secs, 60);
        assert!(config.discovery.methods.is_none());
    }

    #[test]
    fn test_parse_discovery_config() {
        let config_str = r#"
[store]
path = "/var/lib/iscsi/initiator.json"

[discovery]
storm_delay_secs = 120
methods = ["static", "sendtargets"]
"#;

        let config = DaemonConfig::parse(config_str).unwrap();
        assert_eq!(config.discovery.storm_delay_secs, 120);
        assert_eq!(
            config.discovery.methods,
            Some(vec![DiscoveryMethod::Static, DiscoveryMethod::SendTargets])
        );
    }

    #[test]
    fn test_duplicate_method_error() {
        let config_str = r#"
[store]
path = "/etc/iscsi/initiator.json"

[discovery]
methods = ["isns", "isns"]
"#;

        let result = DaemonConfig::parse(config_str);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }
}
