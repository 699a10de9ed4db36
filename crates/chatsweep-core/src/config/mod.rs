//! Configuration management

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Collection prefix Open WebUI-style deployments use for per-user memory
pub const DEFAULT_MEMORY_COLLECTION_PREFIX: &str = "user-memory-";

/// Settings file contents. Every field is optional in YAML.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Prefix joined with a memory row's user id to name that user's collection
    #[serde(default = "default_memory_collection_prefix")]
    pub memory_collection_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            memory_collection_prefix: default_memory_collection_prefix(),
        }
    }
}

fn default_memory_collection_prefix() -> String {
    DEFAULT_MEMORY_COLLECTION_PREFIX.to_string()
}

impl Config {
    /// Load config from default path, falling back to defaults when absent
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Config::default())
        }
    }

    /// Load config from an explicit path; a missing file is an error
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Config::default());
        }
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Get default config path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(crate::CONFIG_DIR_NAME)
            .join("config.yml")
    }
}
