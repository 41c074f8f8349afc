//! Runtime error types.

use crate::config::ConfigError;
use crate::host::HostError;
use hatch_pm::{ArchiveError, DescriptorError, ResolverError};

/// Errors that abort a load. None of them is retried.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Unreadable archive or missing entry
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// Malformed descriptor
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    /// A script reported an error while loading
    #[error("Failed to load script {package}/{path}: {reason}")]
    ScriptLoad {
        package: String,
        path: String,
        reason: String,
    },

    /// The byte loader failed
    #[error("Failed to fetch archive {origin}: {reason}")]
    Source { origin: String, reason: String },

    /// The host rejected a resource
    #[error("Host error: {0}")]
    Host(#[from] HostError),

    /// The content runtime could not be initialized
    #[error("Runtime initialization failed: {0}")]
    Init(String),

    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<ResolverError> for RuntimeError {
    fn from(error: ResolverError) -> Self {
        match error {
            ResolverError::Archive(e) => RuntimeError::Archive(e),
            ResolverError::Descriptor(e) => RuntimeError::Descriptor(e),
        }
    }
}

impl RuntimeError {
    /// Name of the missing archive entry, for [`ArchiveError::EntryNotFound`]
    pub fn missing_entry(&self) -> Option<&str> {
        match self {
            RuntimeError::Archive(ArchiveError::EntryNotFound(name)) => Some(name),
            _ => None,
        }
    }
}
