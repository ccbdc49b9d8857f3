//! Locating and loading the configuration file

use crate::config::{Config, ConfigError};
use std::path::{Path, PathBuf};

/// Directory paths the shell reads configuration from.
///
/// Only `main` should build this from the system; everything else receives
/// it, so tests can point it at a temp directory.
#[derive(Debug, Clone)]
pub struct DirectoryContext {
    /// e.g. ~/.config/jsh on Linux
    pub config_dir: PathBuf,
}

impl DirectoryContext {
    /// Create a DirectoryContext from the system directories
    pub fn from_system() -> std::io::Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "Could not determine config directory",
                )
            })?
            .join("jsh");
        Ok(Self { config_dir })
    }

    /// Create a DirectoryContext rooted in a temp directory
    pub fn for_testing(temp_dir: &Path) -> Self {
        Self {
            config_dir: temp_dir.join("config"),
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join("config.json")
    }
}

/// `<config_dir>/jsh/config.json`, if the platform has a config directory.
pub fn default_config_path() -> Option<PathBuf> {
    DirectoryContext::from_system()
        .ok()
        .map(|dirs| dirs.config_path())
}

impl Config {
    /// Load the effective configuration.
    ///
    /// An explicitly requested file must exist and be valid. The file at
    /// the default location is optional; if it is broken, the problem is
    /// logged and defaults are used.
    pub fn load(explicit: Option<&Path>, dirs: Option<&DirectoryContext>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            let config = Self::load_from_file(path)?;
            tracing::info!("Loaded config from {}", path.display());
            return Ok(config);
        }

        let Some(path) = dirs.map(DirectoryContext::config_path) else {
            tracing::debug!("No config directory, using defaults");
            return Ok(Self::default());
        };
        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        match Self::load_from_file(&path) {
            Ok(config) => {
                tracing::info!("Loaded config from {}", path.display());
                Ok(config)
            }
            Err(e) => {
                tracing::warn!("Failed to load config from {}: {}, using defaults", path.display(), e);
                Ok(Self::default())
            }
        }
    }
}
