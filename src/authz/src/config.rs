//! Engine configuration loading and validation

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{AuthzError, Result};

/// Complete engine configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Default log filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub cache: CacheSection,
}

/// Registry cache settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CacheSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            ttl_secs: default_ttl_secs(),
            capacity: default_capacity(),
        }
    }
}

impl CacheSection {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            cache: CacheSection::default(),
        }
    }
}

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_ttl_secs() -> u64 { 60 }
fn default_capacity() -> usize { 10_000 }

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AuthzError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(contents)
            .map_err(|e| AuthzError::Config(format!("Failed to parse configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.log_level.trim().is_empty() {
            return Err(AuthzError::Config("log_level must not be empty".to_string()));
        }

        if self.cache.enabled {
            if self.cache.capacity == 0 {
                return Err(AuthzError::Config(
                    "cache.capacity must be greater than zero".to_string(),
                ));
            }

            if self.cache.ttl_secs == 0 {
                return Err(AuthzError::Config(
                    "cache.ttl_secs must be greater than zero".to_string(),
                ));
            }
        }

        Ok(())
    }
}
