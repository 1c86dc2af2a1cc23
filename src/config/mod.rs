//! Configuration module for linebridge
//!
//! Configuration is a single TOML document with two tables:
//!
//! ```toml
//! [device]
//! port = "/dev/ttyACM0"
//! baud_rate = 115200
//!
//! [bridge]
//! read_timeout_ms = 100
//! retry_base_ms = 100
//! retry_max_ms = 2000
//! ```
//!
//! Missing keys take their defaults. The default file location is the
//! platform config directory:
//!
//! - **Linux**: `~/.config/linebridge/config.toml`
//! - **macOS**: `~/Library/Application Support/linebridge/config.toml`
//! - **Windows**: `%APPDATA%\linebridge\config.toml`

pub mod settings;

pub use settings::*;

use crate::error::{BridgeError, Result, ResultExt};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for config directories
pub const APP_ID: &str = "linebridge";

/// Config filename
pub const CONFIG_FILE: &str = "config.toml";

/// Get the default config file path
pub fn default_config_path() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID).join(CONFIG_FILE))
}

/// Complete bridge configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Which device to read from
    pub device: DeviceConfig,
    /// How the reader loop behaves
    pub bridge: BridgeSettings,
}

impl BridgeConfig {
    /// Load a config from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Self = toml::from_str(&contents).map_err(|e| {
            BridgeError::Serialization(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save the config as TOML, creating parent directories as needed
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).context("Failed to create config directory")?;
            }
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| BridgeError::Serialization(e.to_string()))?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Load from the default location, falling back to defaults
    pub fn load_or_default() -> Self {
        let Some(path) = default_config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load(&path) {
            Ok(config) => {
                tracing::debug!("Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                tracing::warn!("Failed to load config, using defaults: {}", e);
                Self::default()
            }
        }
    }

    /// Reject values the bridge cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.device.port.trim().is_empty() {
            return Err(BridgeError::Config("port must not be empty".to_string()));
        }
        if self.device.baud_rate == 0 {
            return Err(BridgeError::Config(
                "baud_rate must be positive".to_string(),
            ));
        }
        if self.bridge.read_timeout_ms == 0 {
            return Err(BridgeError::Config(
                "read_timeout_ms must be positive".to_string(),
            ));
        }
        if self.bridge.retry_base_ms == 0 {
            return Err(BridgeError::Config(
                "retry_base_ms must be positive".to_string(),
            ));
        }
        if self.bridge.retry_base_ms > self.bridge.retry_max_ms {
            return Err(BridgeError::Config(format!(
                "retry_base_ms ({}) exceeds retry_max_ms ({})",
                self.bridge.retry_base_ms, self.bridge.retry_max_ms
            )));
        }
        if self.bridge.max_line_length == 0 {
            return Err(BridgeError::Config(
                "max_line_length must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
