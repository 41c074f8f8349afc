//! Loader configuration (hatch.toml)
//!
//! Every field has a default, so an empty file (or no file at all) gives
//! the standard archive layout and event policy.

use crate::events::EventPolicy;
use hatch_pm::ArchiveLayout;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Validation error
    #[error("Invalid config: {0}")]
    ValidationError(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HatchConfig {
    /// Names of the well-known archive entries
    pub archive: ArchiveLayout,

    /// Event deny-list and debounce policy
    pub events: EventPolicy,
}

impl HatchConfig {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse configuration from a string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: HatchConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let archive = &self.archive;
        if archive.root_descriptor.is_empty() {
            return Err(ConfigError::ValidationError(
                "archive.root_descriptor cannot be empty".to_string(),
            ));
        }
        if archive.library_descriptor.is_empty() || archive.library_descriptor.contains('/') {
            return Err(ConfigError::ValidationError(format!(
                "archive.library_descriptor must be a plain file name, got '{}'",
                archive.library_descriptor
            )));
        }
        if !archive.content_namespace.ends_with('/') {
            return Err(ConfigError::ValidationError(format!(
                "archive.content_namespace must end with '/', got '{}'",
                archive.content_namespace
            )));
        }

        let events = &self.events;
        for verb in events.deny.iter().chain(&events.debounce) {
            if verb.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "event verbs cannot be empty".to_string(),
                ));
            }
        }
        if let Some(verb) = events.debounce.iter().find(|v| events.deny.contains(v)) {
            return Err(ConfigError::ValidationError(format!(
                "verb '{}' is both denied and debounced",
                verb
            )));
        }
        if !events.debounce.is_empty() && events.debounce_ms == 0 {
            return Err(ConfigError::ValidationError(
                "events.debounce_ms must be positive when verbs are debounced".to_string(),
            ));
        }

        Ok(())
    }

    /// Serialize to TOML
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}
