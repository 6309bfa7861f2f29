//! Error types for the navigation core.

use thiserror::Error;

/// Result type alias using [`NavError`].
pub type Result<T> = std::result::Result<T, NavError>;

/// Top-level error type for navigation errors.
///
/// Most configuration mistakes are logged and replaced by a fallback at the
/// call site; these variants cover the cases where the caller has to decide.
#[derive(Debug, Error)]
pub enum NavError {
    /// Failed to parse a RON configuration document.
    #[error("Failed to parse configuration '{path}': {source}")]
    ConfigParse {
        /// Path (or label) of the document that failed to parse.
        path: String,
        /// Underlying parse error.
        #[source]
        source: ron::error::SpannedError,
    },

    /// Failed to read a configuration file.
    #[error("Failed to read file '{path}': {source}")]
    Io {
        /// Path to the file.
        path: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Passability configuration is structurally invalid.
    #[error("Invalid passability configuration: {errors:?}")]
    InvalidPassabilityConfig {
        /// Every problem found during validation.
        errors: Vec<String>,
    },

    /// No passability class with this name.
    #[error("Unknown passability class: {0}")]
    UnknownPassabilityClass(String),

    /// Obstruction tag does not refer to a live shape.
    #[error("Unknown obstruction tag: {0:?}")]
    UnknownTag(crate::obstruction::ShapeTag),

    /// Invalid entity reference.
    #[error("Entity not found: {0}")]
    EntityNotFound(u64),

    /// Invalid navigation state (serialization and similar).
    #[error("Invalid navigation state: {0}")]
    InvalidState(String),
}
