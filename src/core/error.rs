//! Error type system for Longbox
//!
//! This module provides the error type used across the core:
//! - Hierarchical error classification
//! - Error context and chaining support
//! - Retryability classification for the job pipeline

use std::path::PathBuf;

/// Main error type for the Longbox system
#[derive(Debug, thiserror::Error)]
pub enum LongboxError {
    // System-level errors
    #[error("System initialization failed: {0}")]
    InitializationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    // Resource errors: fatal for the job that hits them
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Source file missing: {0}")]
    MissingFile(PathBuf),

    // Job pipeline errors
    #[error("Job error: {0}")]
    JobError(String),

    #[error("Conversion from '{source_format}' to '{target_format}' is not implemented")]
    UnsupportedConversion {
        source_format: String,
        target_format: String,
    },

    // I/O errors
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl LongboxError {
    /// Get the error type name for logs and job rows
    pub fn error_type(&self) -> &'static str {
        match self {
            LongboxError::InitializationError(_) => "InitializationError",
            LongboxError::ConfigError(_) => "ConfigError",
            LongboxError::DatabaseError(_) => "DatabaseError",
            LongboxError::NotFound(_) => "NotFound",
            LongboxError::MissingFile(_) => "MissingFile",
            LongboxError::JobError(_) => "JobError",
            LongboxError::UnsupportedConversion { .. } => "UnsupportedConversion",
            LongboxError::IoError(_) => "IoError",
            LongboxError::SerializationError(_) => "SerializationError",
        }
    }

    /// Check if this error is worth a manual re-enqueue
    ///
    /// Resource and I/O problems can resolve themselves (a mount coming
    /// back, a transient lock); unsupported conversions cannot.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LongboxError::DatabaseError(_)
                | LongboxError::IoError(_)
                | LongboxError::MissingFile(_)
        )
    }
}

/// Result type alias for operations that can fail with LongboxError
pub type Result<T> = std::result::Result<T, LongboxError>;

/// Context extension trait for adding context to errors
pub trait ErrorContext<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context to an error using a closure
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::fmt::Display,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let context_str = context.into();
            LongboxError::InitializationError(format!("{}: {}", context_str, e))
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let context_str = f();
            LongboxError::InitializationError(format!("{}: {}", context_str, e))
        })
    }
}
