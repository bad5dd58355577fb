//! Configuration management.
//!
//! Supports configuration from:
//! - TOML config files (`CS_RANGING_CONFIG`, else `<config dir>/cs-ranging/config.toml`)
//! - Environment variables (override the file)

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{CsError, Result};
use crate::host::RecoveryMode;
use crate::protocol::CS_CONFIG_ID;
use crate::sim::SimScript;

/// Main configuration struct
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Ranging configuration
    #[serde(default)]
    pub ranging: RangingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Link-loss recovery configuration
    #[serde(default)]
    pub recovery: RecoveryConfig,

    /// Simulated controller scenario
    #[serde(default)]
    pub sim: SimScript,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| CsError::Config(format!("Failed to read config file: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| CsError::Config(format!("Failed to parse config: {e}")))
    }

    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("cs-ranging").join("config.toml"))
    }

    /// Load the config file (if any), then apply environment overrides
    pub fn load() -> Result<Self> {
        let path = std::env::var_os("CS_RANGING_CONFIG")
            .map(PathBuf::from)
            .or_else(|| Self::default_path().filter(|p| p.exists()));

        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.with_env()
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::default().with_env()
    }

    /// Apply environment overrides on top of `self`
    pub fn with_env(mut self) -> Result<Self> {
        if let Ok(id) = std::env::var("CS_RANGING_CONFIG_ID") {
            self.ranging.config_id = id
                .parse()
                .map_err(|_| CsError::Config(format!("Invalid CS_RANGING_CONFIG_ID: {id}")))?;
        }
        if let Ok(level) = std::env::var("CS_RANGING_LOG") {
            self.logging.level = level;
        }
        if let Ok(json) = std::env::var("CS_RANGING_LOG_JSON") {
            self.logging.json = matches!(json.as_str(), "1" | "true" | "yes");
        }
        if let Ok(mode) = std::env::var("CS_RANGING_RECOVERY") {
            self.recovery.mode = mode.parse()?;
        }

        Ok(self)
    }
}

/// Ranging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangingConfig {
    /// Configuration id used for every session
    pub config_id: u8,
}

impl Default for RangingConfig {
    fn default() -> Self {
        Self {
            config_id: CS_CONFIG_ID,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,

    /// Emit JSON lines instead of text
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Link-loss recovery configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Restart action
    pub mode: RecoveryMode,

    /// Exit code used by `exit` mode
    pub exit_code: i32,

    /// Stop supervising after this many sessions (unbounded when unset)
    pub max_sessions: Option<u64>,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            mode: RecoveryMode::InProcess,
            exit_code: 75,
            max_sessions: None,
        }
    }
}
