use std::env;
use std::path::PathBuf;

use thiserror::Error;

use crate::data::cache::DEFAULT_CAPACITY;

const PREFIX: &str = "TRPL_VIEWER_";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("TRPL_VIEWER_CACHE_CAPACITY must be a positive integer, got {0:?}")]
    InvalidCapacity(String),
}

/// Process-wide settings, read once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Every session directory lives under this directory.
    pub upload_basedir: PathBuf,
    /// Entries per memoized operation.
    pub cache_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            upload_basedir: env::temp_dir().join("trpl_viewer"),
            cache_capacity: DEFAULT_CAPACITY,
        }
    }
}

impl Config {
    /// Read `TRPL_VIEWER_UPLOAD_BASEDIR` and `TRPL_VIEWER_CACHE_CAPACITY`,
    /// falling back to the defaults for unset variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Config::default();
        if let Some(dir) = lookup(&format!("{PREFIX}UPLOAD_BASEDIR")).filter(|d| !d.is_empty()) {
            config.upload_basedir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup(&format!("{PREFIX}CACHE_CAPACITY")) {
            config.cache_capacity = match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => return Err(ConfigError::InvalidCapacity(raw)),
            };
        }
        Ok(config)
    }
}
