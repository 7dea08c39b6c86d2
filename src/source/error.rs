//! Errors observed by data cursor callers.

use crate::source::SourceKind;
use crate::stream::{PipelineError, StreamError};
use thiserror::Error;

/// Errors returned by [`DataCursor`](crate::source::DataCursor) operations
///
/// Malformed rows never appear here: backends drop them and move on. Wire
/// errors only surface while a streaming source is being opened; once its
/// pipeline runs, a closed connection is reported as [`CursorError::EndOfSource`]
/// followed by [`CursorError::SourceClosed`].
#[derive(Error, Debug)]
pub enum CursorError {
    /// No more data is currently available
    #[error("End of source")]
    EndOfSource,

    /// The source has been closed; further reads are a programming error
    #[error("Source is closed")]
    SourceClosed,

    /// The backend cannot produce an independent copy
    #[error("{0} sources cannot be copied")]
    NotCopyable(SourceKind),

    /// The source's metadata is missing or inconsistent
    #[error("Invalid source description: {0}")]
    Description(String),

    /// Delimited file errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Relational backend errors
    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    /// Wire errors while opening a streaming source
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    /// Worker errors while starting or stopping a streaming source
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CursorError {
    /// Whether this is the expected end-of-data condition
    pub fn is_end_of_source(&self) -> bool {
        matches!(self, CursorError::EndOfSource)
    }

    /// Whether the source has been permanently closed
    pub fn is_closed(&self) -> bool {
        matches!(self, CursorError::SourceClosed)
    }
}

pub type CursorResult<T> = std::result::Result<T, CursorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(CursorError::EndOfSource.is_end_of_source());
        assert!(!CursorError::EndOfSource.is_closed());
        assert!(CursorError::SourceClosed.is_closed());
        assert!(!CursorError::SourceClosed.is_end_of_source());
    }

    #[test]
    fn test_not_copyable_display() {
        let err = CursorError::NotCopyable(SourceKind::Streaming);
        assert_eq!(err.to_string(), "streaming sources cannot be copied");
    }
}
