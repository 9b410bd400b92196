//! Configuration management for rootfs.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/rootfs/config.toml`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::listing::DateFormat;
use crate::view;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("elevation command not found: {0}")]
    InvalidElevationCommand(String),

    #[error("root must be an absolute path, got {0}")]
    RelativeRoot(String),

    #[error("home must be an absolute path, got {0}")]
    RelativeHome(String),

    #[error("home {home} is outside root {root}")]
    HomeOutsideRoot { home: String, root: String },

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// How privileged commands are launched.
    pub elevation: ElevationConfig,

    /// Filesystem view settings.
    pub filesystem: FilesystemConfig,

    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Elevation shell configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ElevationConfig {
    /// Elevation program, e.g. `su`.
    pub command: String,

    /// Arguments placed between the program and the operation argv.
    pub args: Vec<String>,
}

/// Filesystem view configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FilesystemConfig {
    /// Every resolved path must stay inside this directory.
    pub root: String,

    /// Base directory for relative protocol paths.
    pub home: String,

    /// Date layout printed by the device's `ls`.
    pub date_format: DateFormat,

    /// Fail a whole listing on the first malformed line instead of skipping it.
    pub strict_listing: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub level: String,
}

impl Default for ElevationConfig {
    fn default() -> Self {
        Self {
            command: "su".to_string(),
            args: vec!["-c".to_string()],
        }
    }
}

impl Default for FilesystemConfig {
    fn default() -> Self {
        Self {
            root: "/".to_string(),
            home: "/".to_string(),
            date_format: DateFormat::default(),
            strict_listing: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rootfs")
        .join("config.toml")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - ROOTFS_ELEVATION_COMMAND: Override the elevation program
    /// - ROOTFS_ROOT: Override the filesystem root; a home left outside the
    ///   new root moves to the root
    /// - ROOTFS_HOME: Override the home directory
    /// - ROOTFS_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(command) = std::env::var("ROOTFS_ELEVATION_COMMAND") {
            if !command.is_empty() {
                tracing::info!("Overriding elevation command from environment: {}", command);
                self.elevation.command = command;
            }
        }

        let mut root_overridden = false;
        if let Ok(root) = std::env::var("ROOTFS_ROOT") {
            if !root.is_empty() {
                tracing::info!("Overriding filesystem root from environment: {}", root);
                self.filesystem.root = root;
                root_overridden = true;
            }
        }

        let mut home_overridden = false;
        if let Ok(home) = std::env::var("ROOTFS_HOME") {
            if !home.is_empty() {
                tracing::info!("Overriding home directory from environment: {}", home);
                self.filesystem.home = home;
                home_overridden = true;
            }
        }

        let root = view::normalize(&self.filesystem.root);
        if root_overridden
            && !home_overridden
            && !view::is_within(&view::normalize(&self.filesystem.home), &root)
        {
            tracing::info!(
                "Home {} is outside root {}, using the root as home",
                self.filesystem.home,
                self.filesystem.root
            );
            self.filesystem.home = self.filesystem.root.clone();
        }

        if let Ok(level) = std::env::var("ROOTFS_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log level from environment: {}", level);
                self.logging.level = level;
            }
        }
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // The elevation program must be runnable
        let command = &self.elevation.command;
        let command_path = Path::new(command);
        let found = if command_path.is_absolute() {
            command_path.exists()
        } else {
            which::which(command).is_ok()
        };
        if !found {
            return Err(ConfigError::InvalidElevationCommand(command.clone()));
        }

        let root = &self.filesystem.root;
        if !root.starts_with('/') {
            return Err(ConfigError::RelativeRoot(root.clone()));
        }

        let home = &self.filesystem.home;
        if !home.starts_with('/') {
            return Err(ConfigError::RelativeHome(home.clone()));
        }

        if !view::is_within(&view::normalize(home), &view::normalize(root)) {
            return Err(ConfigError::HomeOutsideRoot {
                home: home.clone(),
                root: root.clone(),
            });
        }

        let level = self.logging.level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.logging.level.clone()));
        }

        Ok(())
    }

    /// Load configuration from `path`, falling back to defaults when the file
    /// is absent.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => Self::from_toml(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("No config file at {:?}, using defaults", path);
                Ok(Self::default())
            }
            Err(e) => Err(e)
                .with_context(|| format!("Failed to read config file: {}", path.display())),
        }
    }

    /// Load configuration from [`default_config_path`].
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).context("Invalid TOML configuration")
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }

    /// Write the configuration to `path` (used by `rootfs config init`).
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        fs::write(path, self.to_toml()?)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }
}
