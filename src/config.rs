//! Import configuration.
//!
//! Loaded from an optional JSON file, then overridden from the environment:
//!
//! - `IMPORT_INCLUDE`: comma-separated resource types
//! - `IMPORT_EXCLUDE`: comma-separated values (raw cloud IDs)
//! - `IMPORT_TAGS`: comma-separated `key=value` pairs
//! - `IMPORT_INTERPOLATE`: `true` / `false`

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::filter::{FilterSpec, Tag};

/// Error loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Config path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Config file is not valid.
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// Config path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
    /// Environment variable holds an unusable value.
    #[error("invalid value for {name}: {value:?}")]
    InvalidEnv {
        /// Variable name.
        name: &'static str,
        /// Offending value.
        value: String,
    },
}

/// Settings for one import run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Which resources enter the pipeline.
    pub filter: FilterSpec,
    /// Replace literals with references in writers that want them.
    pub interpolate: bool,
    /// Attribute names that always keep their literal value.
    pub skip_interpolation: Vec<String>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            filter: FilterSpec::default(),
            interpolate: true,
            skip_interpolation: vec!["id".to_string()],
        }
    }
}

impl ImportConfig {
    /// Load a JSON config file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `IMPORT_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let include = lookup("IMPORT_INCLUDE").map(|v| split_list(&v));
        let exclude = lookup("IMPORT_EXCLUDE").map(|v| split_list(&v));
        let tags = match lookup("IMPORT_TAGS") {
            Some(value) => Some(
                split_list(&value)
                    .iter()
                    .map(|pair| {
                        Tag::parse(pair).ok_or_else(|| ConfigError::InvalidEnv {
                            name: "IMPORT_TAGS",
                            value: value.clone(),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            None => None,
        };

        if include.is_some() || exclude.is_some() || tags.is_some() {
            // Rebuild so the exclude set is never stale.
            self.filter = FilterSpec::new(
                tags.unwrap_or_else(|| self.filter.tags.clone()),
                include.unwrap_or_else(|| self.filter.include.clone()),
                exclude.unwrap_or_else(|| self.filter.exclude.clone()),
            );
        }

        if let Some(value) = lookup("IMPORT_INTERPOLATE") {
            self.interpolate = match value.trim() {
                "true" | "1" => true,
                "false" | "0" => false,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        name: "IMPORT_INTERPOLATE",
                        value,
                    })
                }
            };
        }

        Ok(())
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
