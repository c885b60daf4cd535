//! Typed errors for backend resolution and dataset validation.
//!
//! Application plumbing (CLI, store, migrations) uses `anyhow` and `?`
//! propagation; this enum covers the cases the harvester core needs to
//! match on or fail fast with before a job record exists.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    /// Unknown backend name in a source's configuration. Fails fast before
    /// any job is created.
    #[error("unknown backend '{0}'")]
    UnknownBackend(String),

    /// Two backends registered under the same name. Registration refuses
    /// this instead of silently letting the last one win.
    #[error("backend '{0}' is already registered")]
    DuplicateBackend(String),

    #[error("no harvest source with slug '{0}'")]
    SourceNotFound(String),

    /// Structural validation failure with the offending field path.
    #[error("validation failed for '{field}': {message}")]
    Validation { field: String, message: String },
}
