//! Configuration Management
//!
//! Handles persistent configuration storage for inspekt.

use crate::context::LocalContext;
use crate::resource::MAX_API_VERSION;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Directories scanned for resource definition files
    #[serde(default)]
    pub resource_paths: Vec<PathBuf>,
    /// Newest resource API version to accept
    #[serde(default)]
    pub max_api_version: Option<u32>,
    /// Target root; `/` when unset
    #[serde(default)]
    pub root: Option<PathBuf>,
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("inspekt").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        Self::load_from(&path)
    }

    /// Load from `path`; a missing or unreadable file gives the defaults
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring malformed config {}: {}", path.display(), e);
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
        // Create parent directory
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        Ok(())
    }

    /// Get effective API version (config > built-in maximum)
    pub fn effective_max_version(&self) -> u32 {
        self.max_api_version.unwrap_or(MAX_API_VERSION)
    }

    /// Execution context for the configured root
    pub fn context(&self) -> LocalContext {
        match &self.root {
            Some(root) => LocalContext::new().with_root(root),
            None => LocalContext::new(),
        }
    }

    /// Remember a resource directory; returns false if already present
    pub fn add_resource_path(&mut self, dir: &Path) -> bool {
        if self.resource_paths.iter().any(|p| p == dir) {
            return false;
        }
        self.resource_paths.push(dir.to_path_buf());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.json"));
        assert_eq!(config, Config::default());
        assert_eq!(config.effective_max_version(), MAX_API_VERSION);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config {
            max_api_version: Some(1),
            ..Config::default()
        };
        assert!(config.add_resource_path(Path::new("/opt/resources")));
        assert!(!config.add_resource_path(Path::new("/opt/resources")));
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path);
        assert_eq!(loaded, config);
        assert_eq!(loaded.effective_max_version(), 1);
    }

    #[test]
    fn test_malformed_config_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(Config::load_from(&path), Config::default());
    }
}
