//! Configuration for the offline cache
//!
//! Configuration is read from `~/.config/carimbo/config.toml` (XDG config dir)
//! when present. Every field has a default, so a missing file or a partial file
//! is fine.
//!
//! ```toml
//! [cache]
//! generation = "gerador-carimbo-cache-v2"
//! manifest = ["/", "/index.html", "/style.css"]
//!
//! [network]
//! origin = "https://carimbo.example.org"
//! fetch_timeout_secs = 30
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::lifecycle::GenerationId;

/// Generation shipped with this build; bump it whenever the manifest changes
pub const DEFAULT_GENERATION: &str = "gerador-carimbo-cache-v2";

/// Assets required for offline operation
pub const DEFAULT_MANIFEST: &[&str] = &[
    "/",
    "/index.html",
    "/style.css",
    "/script.js",
    "/manifest.json",
    "/images/icons/icon-192x192.png",
    "/images/icons/icon-512x512.png",
];

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value in {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    pub network: NetworkConfig,
}

/// Which generation to install and what it contains
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Generation identifier; must change whenever `manifest` changes
    pub generation: String,
    /// Ordered resource locators that make up a generation
    pub manifest: Vec<String>,
    /// Cache root override; defaults to the XDG cache dir
    pub dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            generation: DEFAULT_GENERATION.to_string(),
            manifest: DEFAULT_MANIFEST.iter().map(|s| s.to_string()).collect(),
            dir: None,
        }
    }
}

impl CacheConfig {
    pub fn generation_id(&self) -> GenerationId {
        GenerationId::new(self.generation.clone())
    }
}

/// Where assets are fetched from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Origin that locators are resolved against
    pub origin: String,
    /// Per-request timeout in seconds, 0 disables it
    pub fetch_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:8080".to_string(),
            fetch_timeout_secs: 30,
        }
    }
}

impl NetworkConfig {
    pub fn fetch_timeout(&self) -> Option<Duration> {
        match self.fetch_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

impl Config {
    /// Default config file path (`~/.config/carimbo/config.toml` on Linux)
    pub fn default_path() -> Option<PathBuf> {
        let project_dirs = ProjectDirs::from("", "", "carimbo")?;
        Some(project_dirs.config_dir().join("config.toml"))
    }

    /// Loads configuration
    ///
    /// An explicit `path` must exist. Without one, the default path is used if
    /// the file is there, otherwise defaults apply.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load_from_file(&path),
                _ => {
                    debug!("Config file not found, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if config.cache.generation.trim().is_empty() {
            return Err(ConfigError::Invalid {
                path: path.to_path_buf(),
                reason: "cache.generation must not be empty".to_string(),
            });
        }
        Ok(config)
    }
}
