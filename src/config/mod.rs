//! Configuration for device sessions
//!
//! Settings are stored as TOML (or JSON, chosen by file extension) and every
//! section falls back to its defaults when missing, so a partial file is
//! valid.
//!
//! # Config Location
//!
//! `DeviceConfig::load_or_default()` looks in the platform config directory:
//! - **Linux**: `~/.config/devlink/devlink.toml`
//! - **macOS**: `~/Library/Application Support/devlink/devlink.toml`
//! - **Windows**: `%APPDATA%\devlink\devlink.toml`
//!
//! # Example
//!
//! ```toml
//! [queues]
//! default_max_size = 30
//! default_overwrite = true
//!
//! [watchdog]
//! interval_ms = 500
//! max_failures = 3
//! ```

use crate::error::{DevLinkError, Result};
use crate::queue::{QueueOptions, DEFAULT_QUEUE_SIZE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory name under the platform config dir
pub const APP_DIR: &str = "devlink";

/// Default config file name
pub const CONFIG_FILE: &str = "devlink.toml";

/// Default filter when `RUST_LOG` is not set
pub const DEFAULT_LOG_FILTER: &str = "info,devlink=debug";

/// Path of the default config file, if the platform has a config dir
pub fn default_config_path() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_DIR).join(CONFIG_FILE))
}

// ==================== Sections ====================

/// Defaults for queues created without explicit parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub default_max_size: usize,
    pub default_overwrite: bool,
    /// How often idle stream workers re-check their stop flag
    pub poll_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_max_size: DEFAULT_QUEUE_SIZE,
            default_overwrite: false,
            poll_interval_ms: 10,
        }
    }
}

/// Session liveness checking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    pub enabled: bool,
    pub interval_ms: u64,
    /// Consecutive failed pings before the session is declared dead
    pub max_failures: u32,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 1000,
            max_failures: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    pub timeout_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self { timeout_ms: 2000 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Largest packet a stream is opened for
    pub max_write_size: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_write_size: 5 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, overridden by `RUST_LOG`
    pub filter: String,
    /// Write a daily-rotated log file here in addition to stderr
    pub log_dir: Option<PathBuf>,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            log_dir: None,
            file_prefix: "devlink.log".to_string(),
        }
    }
}

// ==================== Device Config ====================

/// All session settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub queues: QueueConfig,
    pub watchdog: WatchdogConfig,
    pub rpc: RpcConfig,
    pub stream: StreamConfig,
    pub logging: LoggingConfig,
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|e| e.eq_ignore_ascii_case("json"))
}

impl DeviceConfig {
    /// Load a config file. `.json` files are parsed as JSON, anything else as TOML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            DevLinkError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config: Self = if is_json(path) {
            serde_json::from_str(&content).map_err(|e| {
                DevLinkError::Config(format!("Failed to parse config file {:?}: {}", path, e))
            })?
        } else {
            toml::from_str(&content).map_err(|e| {
                DevLinkError::Config(format!("Failed to parse config file {:?}: {}", path, e))
            })?
        };
        config.validate()?;
        Ok(config)
    }

    /// Load from the default location, returning defaults on any error
    pub fn load_or_default() -> Self {
        let Some(path) = default_config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save to disk, creating the parent directory if needed
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DevLinkError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = if is_json(path) {
            serde_json::to_string_pretty(self)
                .map_err(|e| DevLinkError::Config(format!("Failed to serialize config: {}", e)))?
        } else {
            toml::to_string_pretty(self)
                .map_err(|e| DevLinkError::Config(format!("Failed to serialize config: {}", e)))?
        };

        std::fs::write(path, content).map_err(|e| {
            DevLinkError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }

    /// Reject values that would make the runtime misbehave
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(DevLinkError::Config(msg.to_string()));
        if self.queues.default_max_size == 0 {
            return invalid("queues.default_max_size must be at least 1");
        }
        if self.queues.poll_interval_ms == 0 {
            return invalid("queues.poll_interval_ms must be non-zero");
        }
        if self.watchdog.enabled {
            if self.watchdog.interval_ms == 0 {
                return invalid("watchdog.interval_ms must be non-zero");
            }
            if self.watchdog.max_failures == 0 {
                return invalid("watchdog.max_failures must be at least 1");
            }
        }
        if self.rpc.timeout_ms == 0 {
            return invalid("rpc.timeout_ms must be non-zero");
        }
        if self.stream.max_write_size == 0 {
            return invalid("stream.max_write_size must be non-zero");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.queues.poll_interval_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc.timeout_ms)
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_millis(self.watchdog.interval_ms)
    }

    /// Queue options with explicit size/overwrite and the configured timing
    pub fn queue_options(&self, max_size: usize, overwrite: bool) -> QueueOptions {
        QueueOptions {
            max_size,
            overwrite,
            poll_interval: self.poll_interval(),
            max_write_size: self.stream.max_write_size,
        }
    }

    /// Queue options using the configured defaults
    pub fn default_queue_options(&self) -> QueueOptions {
        self.queue_options(self.queues.default_max_size, self.queues.default_overwrite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DeviceConfig::default();
        assert_eq!(config.queues.default_max_size, 120);
        assert!(!config.queues.default_overwrite);
        assert!(config.validate().is_ok());
        assert_eq!(config.default_queue_options().max_size, 120);
    }

    #[test]
    fn test_partial_toml() {
        let config: DeviceConfig = toml::from_str(
            r#"
            [watchdog]
            max_failures = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.watchdog.max_failures, 5);
        assert_eq!(config.watchdog.interval_ms, 1000);
        assert_eq!(config.rpc, RpcConfig::default());
    }

    #[test]
    fn test_validate_rejects_zeroes() {
        let mut config = DeviceConfig::default();
        config.queues.default_max_size = 0;
        assert!(config.validate().is_err());

        let mut config = DeviceConfig::default();
        config.watchdog.max_failures = 0;
        assert!(config.validate().is_err());
        config.watchdog.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_load_toml_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = DeviceConfig::default();
        config.queues.default_overwrite = true;
        config.logging.log_dir = Some(dir.path().join("logs"));

        for name in ["nested/devlink.toml", "devlink.json"] {
            let path = dir.path().join(name);
            config.save(&path).unwrap();
            assert_eq!(DeviceConfig::load(&path).unwrap(), config);
        }
    }

    #[test]
    fn test_load_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[queues]\ndefault_max_size = 0\n").unwrap();
        assert!(matches!(DeviceConfig::load(&path), Err(DevLinkError::Config(_))));
        assert!(DeviceConfig::load(dir.path().join("missing.toml")).is_err());
    }
}
