//! Error handling for specvis-rs
//!
//! This module defines the crate-wide error type and a Result alias. Errors
//! raised inside the processing chain live in [`crate::processor::error`] and
//! convert into [`SpecVisError`] through `From`.

use crate::processor::error::PipelineError;
use thiserror::Error;

/// Main error type for specvis-rs operations
#[derive(Error, Debug)]
pub enum SpecVisError {
    /// Errors raised while running the processor chain or driving the pipeline
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Errors related to configuration loading/saving/validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors reported by a capture source
    #[error("Capture error: {0}")]
    Capture(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<SpecVisError>,
    },
}

impl SpecVisError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        SpecVisError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Result type alias for specvis-rs operations
pub type Result<T> = std::result::Result<T, SpecVisError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, PipelineError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| SpecVisError::from(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| SpecVisError::from(e).with_context(f()))
    }
}
