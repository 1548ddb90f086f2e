//! Error types for the governance baseline.
//!
//! Only problems that stop a run before it touches the account surface as
//! `Err`: a bad catalog, bad configuration, unreadable files. Per-control
//! inspection and apply failures are report entries, not errors.

use thiserror::Error;

/// The unified error type for the baseline crates.
#[derive(Debug, Error)]
pub enum BaselineError {
    /// The catalog's dependency graph contains a cycle.
    #[error("dependency cycle detected: {}", cycle.join(" -> "))]
    CycleDetected { cycle: Vec<String> },

    /// A control lists a dependency that is not in the catalog.
    #[error("control '{control}' depends on unknown control '{dependency}'")]
    UnknownDependency { control: String, dependency: String },

    /// Two controls share the same identifier.
    #[error("duplicate control identifier '{id}'")]
    DuplicateControl { id: String },

    /// A control's desired attributes do not fit its resource kind.
    #[error("control '{control}' has invalid desired state: {reason}")]
    InvalidDesiredState { control: String, reason: String },

    /// The catalog document could not be read or parsed.
    #[error("catalog error: {reason}")]
    CatalogError { reason: String },

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    /// The mutation journal could not record an entry.
    #[error("journal write failed: {reason}")]
    JournalWriteFailed { reason: String },

    /// Reading or writing a local file failed.
    #[error("i/o error on '{path}': {reason}")]
    Io { path: String, reason: String },
}

impl BaselineError {
    /// True for errors raised while loading or validating the catalog or the
    /// configuration. These abort the run before any account access.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            BaselineError::CycleDetected { .. }
                | BaselineError::UnknownDependency { .. }
                | BaselineError::DuplicateControl { .. }
                | BaselineError::InvalidDesiredState { .. }
                | BaselineError::CatalogError { .. }
                | BaselineError::ConfigError { .. }
        )
    }
}

/// Convenience alias used throughout the baseline crates.
pub type BaselineResult<T> = Result<T, BaselineError>;
