//! Configuration loading and root folder resolution
//!
//! Settings sources, highest priority first:
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants)
//!
//! A missing TOML file is not an error: the service starts with defaults.

use crate::audiometry::Protocol;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "HEARSCREEN_ROOT_FOLDER";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Folder holding the database (optional; see [`resolve_root_folder`])
    pub root_folder: Option<PathBuf>,

    /// Database file name, relative to the root folder
    pub database_file: String,

    /// Swap left/right at the delivery boundary for reversed playback targets
    pub swap_stereo_channels: bool,

    pub tone: ToneConfig,

    pub protocol: Protocol,

    pub logging: LoggingConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            database_file: default_database_file(),
            swap_stereo_channels: false,
            tone: ToneConfig::default(),
            protocol: Protocol::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Stimulus presentation settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToneConfig {
    /// Clip length used by the test client (seconds)
    pub duration_s: f64,
}

impl Default for ToneConfig {
    fn default() -> Self {
        Self { duration_s: 0.35 }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_database_file() -> String {
    "hearscreen.db".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig =
            toml::from_str(content).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit file; the file must exist
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read config file {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load from `path` if given, otherwise from the platform default location,
    /// falling back to built-in defaults when no file exists
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        match default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            Some(path) => {
                warn!(
                    "No config file at {}; using built-in defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            None => {
                warn!("Could not determine config directory; using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.protocol
            .validate()
            .map_err(|e| Error::Config(format!("Invalid [protocol]: {}", e)))?;

        let duration = self.tone.duration_s;
        if !duration.is_finite() || duration <= 0.0 || duration > crate::tone::MAX_DURATION_S {
            return Err(Error::Config(format!(
                "[tone] duration_s must be in (0, {}], got {}",
                crate::tone::MAX_DURATION_S,
                duration
            )));
        }

        if self.database_file.trim().is_empty() {
            return Err(Error::Config("database_file must not be empty".to_string()));
        }

        Ok(())
    }

    /// Database location inside `root_folder`
    pub fn database_path(&self, root_folder: &Path) -> PathBuf {
        root_folder.join(&self.database_file)
    }
}

/// Resolve the root folder: CLI → environment → TOML → OS default
pub fn resolve_root_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    toml_root: Option<&Path>,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = toml_root {
        return path.to_path_buf();
    }

    default_root_folder()
}

/// Platform config file location (`<config dir>/hearscreen/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("hearscreen").join("config.toml"))
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("hearscreen"))
        .unwrap_or_else(|| PathBuf::from("./hearscreen_data"))
}
