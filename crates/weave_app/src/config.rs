//! Application configuration
//!
//! Weave applications read an optional `weave.toml`:
//!
//! ```toml
//! title = "Dashboard"
//! root_selector = "#app"
//! log_filter = "weave_tree=debug,info"
//!
//! [registry]
//! max_random_attempts = 1000
//! seed = 42
//! ```
//!
//! Every field has a default, so an empty file is a valid configuration.

use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use weave_core::registry::DEFAULT_MAX_RANDOM_ATTEMPTS;
use weave_core::{ComponentRegistry, WeaveError};

/// Top-level application configuration
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// Document title set when the root component mounts
    pub title: String,
    /// Selector of the mount point, `#id` or a tag name
    pub root_selector: String,
    /// Default tracing filter when `RUST_LOG` is unset
    pub log_filter: String,
    pub registry: RegistryConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Untitled".to_string(),
            root_selector: "#app".to_string(),
            log_filter: "info".to_string(),
            registry: RegistryConfig::default(),
        }
    }
}

/// Component id registry settings
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Random suffix draws before falling back to a linear scan
    pub max_random_attempts: usize,
    /// Seed for reproducible ids
    pub seed: Option<u64>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_random_attempts: DEFAULT_MAX_RANDOM_ATTEMPTS,
            seed: None,
        }
    }
}

impl RegistryConfig {
    /// Build a registry with these settings
    pub fn build(&self) -> ComponentRegistry {
        let registry = match self.seed {
            Some(seed) => ComponentRegistry::with_seed(seed),
            None => ComponentRegistry::new(),
        };
        registry.with_max_random_attempts(self.max_random_attempts)
    }
}

impl AppConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> weave_core::Result<Self> {
        toml::from_str(content).map_err(|e| WeaveError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let config: AppConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        Ok(config)
    }

    /// Serialize to TOML string
    pub fn to_toml(&self) -> anyhow::Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_root_selector(mut self, selector: impl Into<String>) -> Self {
        self.root_selector = selector.into();
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.registry.seed = Some(seed);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.title, "Untitled");
        assert_eq!(config.root_selector, "#app");
        assert_eq!(config.registry.max_random_attempts, 1000);
        assert_eq!(config.registry.seed, None);
    }

    #[test]
    fn test_partial_config() {
        let config = AppConfig::from_toml_str(
            r#"
            title = "Dashboard"

            [registry]
            seed = 7
            "#,
        )
        .unwrap();
        assert_eq!(config.title, "Dashboard");
        assert_eq!(config.log_filter, "info");
        assert_eq!(config.registry.seed, Some(7));
        assert_eq!(config.registry.max_random_attempts, 1000);
    }

    #[test]
    fn test_invalid_config() {
        let err = AppConfig::from_toml_str("title = 3").unwrap_err();
        assert!(matches!(err, WeaveError::Config(_)));
    }

    #[test]
    fn test_seeded_registries_agree() {
        let config = RegistryConfig {
            max_random_attempts: 10,
            seed: Some(9),
        };
        let mut a = config.build();
        let mut b = config.build();
        assert_eq!(a.issue_id("App").unwrap(), b.issue_id("App").unwrap());
    }

    #[test]
    fn test_load_and_round_trip() {
        let path = std::env::temp_dir().join(format!("weave-config-{}.toml", std::process::id()));
        let config = AppConfig::default().with_title("Saved").with_seed(3);
        fs::write(&path, config.to_toml().unwrap()).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(loaded, config);

        assert!(AppConfig::load(&path).is_err());
    }
}
