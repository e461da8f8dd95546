//! Configuration Management
//!
//! Handles persistent configuration storage for gdcl and turns it into the
//! library's [`ClientConfig`].

use crate::gcp::client::ClientConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Default project for manifests and list scopes
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub zone: Option<String>,
    /// API base path override (emulators, test servers)
    #[serde(default)]
    pub base_path: Option<String>,
    /// Timeout for one apply / delete, in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("gdcl").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load configuration from a file; missing or unreadable files yield defaults
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring invalid config {:?}: {}", path, e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating config directory {:?}", parent))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).with_context(|| format!("writing config {:?}", path))?;

        Ok(())
    }

    /// Get effective project (CLI > config > gcloud default)
    pub fn effective_project(&self, cli: Option<&str>) -> Option<String> {
        cli.map(|s| s.to_string())
            .or_else(|| self.project.clone())
            .or_else(crate::gcp::auth::get_default_project)
    }

    /// Get effective region (config > gcloud default)
    pub fn effective_region(&self) -> Option<String> {
        self.region
            .clone()
            .or_else(crate::gcp::auth::get_default_region)
    }

    /// Get effective zone (config > gcloud default)
    pub fn effective_zone(&self) -> Option<String> {
        self.zone.clone().or_else(crate::gcp::auth::get_default_zone)
    }

    /// Client settings, CLI values taking precedence
    pub fn to_client_config(&self, base_path: Option<&str>, timeout_secs: Option<u64>) -> ClientConfig {
        let defaults = ClientConfig::default();
        let timeout = timeout_secs
            .or(self.timeout_secs)
            .map(|secs| defaults.timeout_or(Duration::from_secs(secs)))
            .unwrap_or(defaults.timeout);
        ClientConfig {
            base_path: base_path
                .map(|s| s.to_string())
                .or_else(|| self.base_path.clone()),
            timeout,
            ..defaults
        }
    }
}
