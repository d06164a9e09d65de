//! Configuration file management.

use std::path::{Path, PathBuf};

use accrue_engine::EngineConfig;
use serde::{Deserialize, Serialize};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "ACCRUE_DATA_DIR";

/// Complete CLI configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccrueConfig {
    /// Storage settings.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Deployment settings.
    #[serde(default)]
    pub engine: EngineSection,
}

/// Storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory. Empty = `ACCRUE_DATA_DIR`, then platform default.
    #[serde(default)]
    pub data_dir: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace" | "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Where the deployment description lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSection {
    /// Deployment TOML. Relative paths resolve against the data directory.
    #[serde(default = "default_deployment")]
    pub deployment: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_deployment() -> String {
    "deployment.toml".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            deployment: default_deployment(),
        }
    }
}

impl AccrueConfig {
    /// Load configuration from `path`, or from the default location.
    ///
    /// Falls back to defaults if the default file does not exist. An explicit
    /// path must exist.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default = Self::config_path();
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };
        let content = std::fs::read_to_string(&config_path)?;
        let config: AccrueConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> PathBuf {
        if self.storage.data_dir.is_empty() {
            Self::default_data_dir()
        } else {
            PathBuf::from(&self.storage.data_dir)
        }
    }

    /// Get the deployment file path.
    pub fn deployment_path(&self) -> PathBuf {
        let path = PathBuf::from(&self.engine.deployment);
        if path.is_absolute() {
            path
        } else {
            self.data_dir().join(path)
        }
    }

    /// Read and parse the deployment file.
    pub fn load_deployment(&self) -> anyhow::Result<EngineConfig> {
        let path = self.deployment_path();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
        Ok(EngineConfig::from_toml_str(&content)?)
    }

    /// Get the config file path.
    fn config_path() -> PathBuf {
        Self::default_data_dir().join("config.toml")
    }

    /// Platform-specific default data directory.
    fn default_data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            return PathBuf::from(dir);
        }
        #[cfg(target_os = "macos")]
        {
            dirs_fallback("Library/Application Support/Accrue")
        }
        #[cfg(target_os = "windows")]
        {
            dirs_fallback("Accrue")
        }
        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        {
            dirs_fallback(".accrue")
        }
    }
}

/// Fallback home directory resolution.
fn dirs_fallback(subpath: &str) -> PathBuf {
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(subpath))
        .unwrap_or_else(|_| PathBuf::from("/tmp/accrue"))
}
