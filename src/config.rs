// src/config.rs

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};

/// Environment variable naming a YAML config file for the binaries.
pub const CONFIG_ENV: &str = "CQLSCHEMA_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    /// Only refresh these keyspaces; empty means all of them.
    pub refreshed_keyspaces: Vec<String>,
    /// Upper bound for the whole query fan-out of one refresh.
    pub request_timeout_ms: u64,
    /// Capacity of the schema change broadcast channel.
    pub event_capacity: usize,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            refreshed_keyspaces: Vec::new(),
            request_timeout_ms: 2000,
            event_capacity: 64,
        }
    }
}

impl SchemaConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml).context("parsing schema config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = fs::read_to_string(path)
            .with_context(|| format!("reading schema config {}", path.display()))?;
        Self::from_yaml_str(&yaml).with_context(|| format!("loading {}", path.display()))
    }

    /// Load from the file named by [`CONFIG_ENV`], or the defaults when it is unset.
    pub fn from_env() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_path(path),
            None => Ok(Self::default()),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.request_timeout_ms > 0, "request_timeout_ms must be positive");
        anyhow::ensure!(self.event_capacity > 0, "event_capacity must be positive");
        Ok(())
    }
}
