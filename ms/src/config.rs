//! Configuration for memorystore

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the store directory
    #[serde(default = "default_store_path", rename = "store-path")]
    pub store_path: PathBuf,

    /// Default number of query hits
    #[serde(default = "default_top_k", rename = "default-top-k")]
    pub default_top_k: usize,

    /// Collection used when a command does not name one
    #[serde(default = "default_collection", rename = "default-collection")]
    pub default_collection: String,
}

fn default_store_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("memorystore")
}

fn default_top_k() -> usize {
    crate::DEFAULT_TOP_K
}

fn default_collection() -> String {
    crate::MEMORIES_COLLECTION.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            default_top_k: default_top_k(),
            default_collection: default_collection(),
        }
    }
}

impl Config {
    /// Load config from file, or use defaults
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        if let Some(config_path) = path {
            return Self::load_from_file(config_path);
        }

        let default_paths = [
            Some(PathBuf::from("memorystore.yml")),
            dirs::config_dir().map(|p| p.join("memorystore").join("config.yml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                return Self::load_from_file(path);
            }
        }

        Ok(Config::default())
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).context(format!("Failed to read config: {}", path.display()))?;
        serde_yaml::from_str(&content).context(format!("Failed to parse config: {}", path.display()))
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
