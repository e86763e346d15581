//! Configuration management for VitalLedger.

use crate::error::{CoreError, Result};
use crate::principal::Principal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub registry: RegistryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// The single principal allowed to authorize consumers.
    pub admin: Principal,
    pub database_path: PathBuf,
    #[serde(default = "default_node_id")]
    pub node_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Fallback filter when `RUST_LOG` is unset.
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::Pretty,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

fn default_node_id() -> String {
    "vitalledger-node-1".to_string()
}

impl Config {
    #[cfg(feature = "toml")]
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        Ok(config)
    }

    #[cfg(feature = "toml")]
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults for everything except the administrator.
    pub fn new(admin: Principal) -> Self {
        Self {
            registry: RegistryConfig {
                admin,
                database_path: PathBuf::from("data/vitalledger.db"),
                node_id: default_node_id(),
            },
            logging: LoggingConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.registry.database_path.as_os_str().is_empty() {
            return Err(CoreError::Config(
                "registry.database_path cannot be empty".to_string(),
            ));
        }

        if self.registry.node_id.trim().is_empty() {
            return Err(CoreError::Config(
                "registry.node_id cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}
