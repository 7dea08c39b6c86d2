//! Error handling for DataVis-Ingest
//!
//! Each layer has its own error enum next to the code that raises it:
//!
//! - [`StreamError`] / [`PipelineError`] in [`crate::stream`] for wire and worker failures
//! - [`CursorError`] in [`crate::source`] for what cursor callers observe
//!
//! Worker failures reach callers through [`CursorError::Pipeline`].
//!
//! [`IngestError`] is the crate-level umbrella used by configuration loading and
//! the command line front end, together with a [`Result`] alias and the
//! [`ResultExt`] context helpers.
//!
//! [`PipelineError`]: crate::stream::PipelineError

use crate::source::CursorError;
use crate::stream::StreamError;
use thiserror::Error;

/// Main error type for DataVis-Ingest operations
#[derive(Error, Debug)]
pub enum IngestError {
    /// Errors raised by a data cursor
    #[error("Cursor error: {0}")]
    Cursor(#[from] CursorError),

    /// Errors raised on the wire
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<IngestError>,
    },
}

impl IngestError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        IngestError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Result type alias for DataVis-Ingest operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<IngestError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().with_context(f()))
    }
}
