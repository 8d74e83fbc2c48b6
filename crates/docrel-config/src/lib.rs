//! Engine configuration loaded from TOML.
//!
//! Only shape and range validation happens here; the engine consumes the
//! validated [`EngineConfig`] as plain data.

use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use thiserror::Error as ThisError;

///
/// CONSTANTS
///

pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_MAX_COMMIT_RETRIES: u32 = 8;
pub const DEFAULT_MAX_IDENTIFIER_LENGTH: usize = 63;
pub const DEFAULT_DATABASE: &str = "docrel";

/// Shortest identifier budget that still leaves room for type suffixes and
/// collision counters.
pub const MIN_IDENTIFIER_LENGTH: usize = 16;

///
/// ConfigError
///

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("config file '{path}' could not be read: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

///
/// EngineConfig
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Worker threads, each owning one backend connection.
    pub workers: usize,

    /// Re-plan attempts after a catalog conflict before the job fails.
    pub max_commit_retries: u32,

    /// Upper bound for derived schema, table, and column identifiers.
    pub max_identifier_length: usize,

    pub catalog: CatalogConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            max_commit_retries: DEFAULT_MAX_COMMIT_RETRIES,
            max_identifier_length: DEFAULT_MAX_IDENTIFIER_LENGTH,
            catalog: CatalogConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;

        Ok(config)
    }

    /// Read, parse, and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid {
                field: "workers",
                reason: "at least one worker is required".to_string(),
            });
        }

        if !(MIN_IDENTIFIER_LENGTH..=DEFAULT_MAX_IDENTIFIER_LENGTH)
            .contains(&self.max_identifier_length)
        {
            return Err(ConfigError::Invalid {
                field: "max_identifier_length",
                reason: format!(
                    "must be within {MIN_IDENTIFIER_LENGTH}..={DEFAULT_MAX_IDENTIFIER_LENGTH}, \
                     found {}",
                    self.max_identifier_length
                ),
            });
        }

        if self.catalog.default_database.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "catalog.default_database",
                reason: "must not be empty".to_string(),
            });
        }

        Ok(())
    }
}

///
/// CatalogConfig
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CatalogConfig {
    /// Database used when a caller does not name one.
    pub default_database: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            default_database: DEFAULT_DATABASE.to_string(),
        }
    }
}

///
/// TESTS
///
