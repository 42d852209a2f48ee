//! Persistence for [`ClientConfig`].

use log::debug;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::client::ClientConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("config file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Loads and saves the client configuration. Nothing in the client depends on the storage format.
pub trait ConfigStore: Send + Sync {
    fn load(&self) -> Result<ClientConfig, ConfigError>;
    fn save(&self, config: &ClientConfig) -> Result<(), ConfigError>;
}

/// Stores the configuration as a pretty-printed JSON file.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub const FILE_NAME: &'static str = "PartyMapRelay.Config.json";

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store using the default file name inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(Self::FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for JsonFileStore {
    /// A missing file yields the default configuration.
    fn load(&self) -> Result<ClientConfig, ConfigError> {
        if !self.path.exists() {
            debug!("[Config] {} not found, using defaults", self.path.display());
            return Ok(ClientConfig::default());
        }
        let text = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&text)?)
    }

    fn save(&self, config: &ClientConfig) -> Result<(), ConfigError> {
        let text = serde_json::to_string_pretty(config)?;
        std::fs::write(&self.path, text)?;
        Ok(())
    }
}
