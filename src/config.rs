//! Runtime configuration
//!
//! Defaults match the legacy environment (`SET DELETED OFF`, `SET EXACT OFF`).
//! Every setting can be overridden from `XBASE_*` environment variables.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Directory holding free table files
    pub data_dir: PathBuf,

    /// Persist after every mutating call instead of on close/flush
    pub sync_on_write: bool,

    /// Navigation skips tombstoned records (`SET DELETED ON`)
    pub deleted: bool,

    /// Character SEEK requires a full-length match (`SET EXACT ON`)
    pub exact: bool,

    /// Logging configuration
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            sync_on_write: false,
            deleted: false,
            exact: false,
            logging: LoggingConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Configuration rooted at `data_dir` with default settings
    pub fn with_data_dir<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file, then apply environment overrides
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let mut config: Self = serde_json::from_str(&text)
            .map_err(|e| Error::ConfigError(format!("{}: {}", path.as_ref().display(), e)))?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(dir) = std::env::var("XBASE_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Ok(sync) = std::env::var("XBASE_SYNC_ON_WRITE") {
            self.sync_on_write = parse_flag("XBASE_SYNC_ON_WRITE", &sync)?;
        }
        if let Ok(deleted) = std::env::var("XBASE_DELETED") {
            self.deleted = parse_flag("XBASE_DELETED", &deleted)?;
        }
        if let Ok(exact) = std::env::var("XBASE_EXACT") {
            self.exact = parse_flag("XBASE_EXACT", &exact)?;
        }
        if let Ok(level) = std::env::var("XBASE_LOG_LEVEL") {
            self.logging.level = level;
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(Error::ConfigError("data_dir must not be empty".to_string()));
        }
        if self.data_dir.exists() && !self.data_dir.is_dir() {
            return Err(Error::ConfigError(format!(
                "data_dir is not a directory: {:?}",
                self.data_dir
            )));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(Error::ConfigError(format!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(Error::ConfigError(format!(
                "Invalid log format: {}",
                self.logging.format
            )));
        }

        Ok(())
    }
}

/// `ON`/`OFF` style flags as well as true/false
fn parse_flag(var: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        _ => Err(Error::ConfigError(format!("Invalid {}", var))),
    }
}

/// Install a global `tracing` subscriber. `RUST_LOG` wins over the configured level.
///
/// Returns false when a subscriber was already installed.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("xbase_core={}", config.level)));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = match config.format.as_str() {
        "compact" => builder.compact().try_init(),
        _ => builder.pretty().try_init(),
    };
    result.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = RuntimeConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.deleted);
        assert!(!config.exact);
    }

    #[test]
    fn test_rejects_bad_level() {
        let mut config = RuntimeConfig::default();
        config.logging.level = "loud".to_string();
        assert!(matches!(config.validate(), Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("X", "ON").unwrap());
        assert!(!parse_flag("X", "off").unwrap());
        assert!(parse_flag("X", "maybe").is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("xbase.json");
        let mut config = RuntimeConfig::with_data_dir(dir.path());
        config.deleted = true;
        std::fs::write(&path, serde_json::to_string(&config).unwrap()).unwrap();

        let loaded = RuntimeConfig::from_file(&path).unwrap();
        assert!(loaded.deleted);
        assert_eq!(loaded.data_dir, dir.path());
    }

    #[test]
    fn test_init_logging_twice() {
        let config = LoggingConfig::default();
        init_logging(&config);
        assert!(!init_logging(&config));
    }
}
