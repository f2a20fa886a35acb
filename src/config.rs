//! Configuration System using Figment
//!
//! Strongly-typed configuration for the status controller. Sources are merged in order:
//! 1. Built-in defaults
//! 2. `config/pixium.toml` (or an explicit file)
//! 3. Environment variables prefixed with `PIXIUM_`, nested keys separated by `__`
//!
//! # Example
//! ```no_run
//! use pixium_status::config::StatusConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = StatusConfig::load()?;
//! config.validate()?;
//! println!("Detector: {}", config.detector.name);
//! # Ok(())
//! # }
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{AppResult, StatusError};

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/pixium.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Detector PV naming
    #[serde(default)]
    pub detector: DetectorConfig,
    /// Bulk refresh settings
    #[serde(default)]
    pub refresh: RefreshConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

/// PV prefixes of the three device models
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Human-readable detector name
    pub name: String,
    /// Prefix of the driver (`cam`) records
    pub ad_base_prefix: String,
    /// Prefix of the file-saver plugin records
    pub file_saver_prefix: String,
    /// Prefix of the MJPEG plugin records
    pub mjpeg_prefix: String,
}

/// Bulk refresh configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Upper bound on a bulk refresh, in milliseconds
    #[serde(default = "default_refresh_timeout")]
    pub timeout_ms: u64,
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_refresh_timeout() -> u64 {
    5000
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "Pixium Status".to_string(),
            log_level: "info".to_string(),
            log_format: default_log_format(),
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            name: "pixium".to_string(),
            ad_base_prefix: "BL12I-EA-DET-05:CAM:".to_string(),
            file_saver_prefix: "BL12I-EA-DET-05:HDF5:".to_string(),
            mjpeg_prefix: "BL12I-EA-DET-05:MJPG:".to_string(),
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_refresh_timeout(),
        }
    }
}

impl StatusConfig {
    /// Load configuration from `config/pixium.toml` and environment variables
    ///
    /// Environment variables override the file, e.g.
    /// `PIXIUM_APPLICATION__LOG_LEVEL=debug`.
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config = Self::figment(path.as_ref()).extract()?;
        Ok(config)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(StatusConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("PIXIUM_").split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(StatusError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.to_lowercase().as_str()) {
            return Err(StatusError::Configuration(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            )));
        }

        let prefixes = [
            ("ad_base_prefix", &self.detector.ad_base_prefix),
            ("file_saver_prefix", &self.detector.file_saver_prefix),
            ("mjpeg_prefix", &self.detector.mjpeg_prefix),
        ];
        let mut seen = std::collections::HashSet::new();
        for (key, prefix) in prefixes {
            if prefix.trim().is_empty() {
                return Err(StatusError::Configuration(format!(
                    "detector.{key} must not be empty"
                )));
            }
            if !seen.insert(prefix.as_str()) {
                return Err(StatusError::Configuration(format!(
                    "Duplicate PV prefix '{prefix}' for detector.{key}"
                )));
            }
        }

        if self.refresh.timeout_ms == 0 {
            return Err(StatusError::Configuration(
                "refresh.timeout_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Bulk refresh timeout as a `Duration`
    pub fn refresh_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.refresh.timeout_ms)
    }
}
