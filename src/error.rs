//! Engine-wide error types.
//!
//! This module provides a unified error hierarchy for the catalogue
//! engine. Library modules return [`Error`] via `thiserror`; the CLI
//! binary uses `anyhow` for convenient top-level propagation.
//!
//! # Design
//!
//! - [`Error`]: top-level engine error, one variant per taxonomy kind
//!   (`Validation`, `NotFound`, `Io`, `Integrity`, `Extractor`,
//!   `Cancelled`, plus a few engine-specific wrappers).
//! - All variants implement `std::error::Error` via `thiserror`.

use std::path::PathBuf;

/// Engine-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level catalogue engine error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Database error surfaced from sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A write failed schema validation (bad HAMMS length, out-of-range
    /// BPM, malformed Camelot code). Never touches the row.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A catalogue row was required but absent, or a path does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A stored row failed to deserialize into a domain type. Callers
    /// should treat this as a cache miss where possible.
    #[error("Data integrity error: {0}")]
    Integrity(String),

    /// Surfaced from an `AudioFeatureExtractor` implementation.
    #[error("Extractor error: {0}")]
    Extractor(String),

    /// Cooperative cancellation was observed.
    #[error("Operation cancelled")]
    Cancelled,

    /// Library root is missing, not a directory, or unreadable.
    #[error("Invalid library path: {0}")]
    InvalidLibraryPath(PathBuf),

    /// Configuration could not be loaded or saved.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error with added context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity(message.into())
    }

    pub fn extractor(message: impl Into<String>) -> Self {
        Self::Extractor(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Io(e).context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, sqlx::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Database(e).context(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::not_found("/path/to/file.mp3");
        assert!(err.to_string().contains("/path/to/file.mp3"));
    }

    #[test]
    fn test_error_with_context() {
        let err = Error::extractor("decode failure").context("while analyzing track");
        let msg = err.to_string();
        assert!(msg.contains("while analyzing track"));
    }

    #[test]
    fn test_validation_error() {
        let err = Error::validation("hamms vector must have 12 elements");
        assert!(err.to_string().contains("12 elements"));
    }

    #[test]
    fn test_result_ext() {
        let result: Result<()> = Err(Error::extractor("timeout"));
        let with_ctx = result.with_context("batch 3");
        assert!(with_ctx.unwrap_err().to_string().contains("batch 3"));
    }
}
