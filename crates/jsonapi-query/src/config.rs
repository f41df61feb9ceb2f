//! Query compiler configuration.
//!
//! Configuration can be specified in a TOML file under the `[jsonapi]` section.
//!
//! # Example Configuration
//!
//! ```toml
//! [jsonapi]
//! strict_paths = false
//! max_joins = 16
//! max_conditions = 100
//! schema = "public"
//!
//! [jsonapi.pagination]
//! size = 25
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use jsonapi_storage::PageRequest;

use crate::sql_builder::{DEFAULT_MAX_CONDITIONS, DEFAULT_MAX_JOINS};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Settings applied to every compiled query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Pagination for collection requests that carry no `page` parameter.
    /// Default: none (unpaginated)
    #[serde(default)]
    pub pagination: Option<PageRequest>,

    /// Reject unresolvable relation paths instead of dropping them.
    /// Default: false
    #[serde(default = "default_strict_paths")]
    pub strict_paths: bool,

    /// Maximum number of joins in one query.
    /// Default: 16
    #[serde(default = "default_max_joins")]
    pub max_joins: usize,

    /// Maximum number of predicates in one query.
    /// Default: 100
    #[serde(default = "default_max_conditions")]
    pub max_conditions: usize,

    /// PostgreSQL schema qualifying every table.
    #[serde(default)]
    pub schema: Option<String>,
}

fn default_strict_paths() -> bool {
    false
}

fn default_max_joins() -> usize {
    DEFAULT_MAX_JOINS
}

fn default_max_conditions() -> usize {
    DEFAULT_MAX_CONDITIONS
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            pagination: None,
            strict_paths: default_strict_paths(),
            max_joins: default_max_joins(),
            max_conditions: default_max_conditions(),
            schema: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    jsonapi: QueryConfig,
}

impl QueryConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration values are invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_joins == 0 {
            return Err("jsonapi.max_joins must be > 0".into());
        }
        if self.max_conditions == 0 {
            return Err("jsonapi.max_conditions must be > 0".into());
        }
        match self.pagination {
            Some(PageRequest::Numbered { size: 0, .. }) => {
                return Err("jsonapi.pagination.size must be > 0".into());
            }
            Some(PageRequest::Offset { limit: 0, .. }) => {
                return Err("jsonapi.pagination.limit must be > 0".into());
            }
            _ => {}
        }
        if self.schema.as_deref().is_some_and(str::is_empty) {
            return Err("jsonapi.schema must not be empty".into());
        }
        Ok(())
    }

    /// Parse the `[jsonapi]` section of a TOML document and validate it.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(source)?;
        file.jsonapi.validate().map_err(ConfigError::Invalid)?;
        Ok(file.jsonapi)
    }

    /// Load the configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }
}
