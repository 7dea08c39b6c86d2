//! Wire- and pipeline-level error types.

use std::time::Duration;
use thiserror::Error;

/// Errors raised while framing, receiving or parsing data on a stream
#[derive(Error, Debug)]
pub enum StreamError {
    /// The peer closed the connection (a read returned zero bytes)
    #[error("Connection closed by peer")]
    ConnectionClosed,

    /// Every read attempt in the retry budget timed out
    #[error("No data received after {attempts} attempts")]
    ReceiveTimeoutExceeded { attempts: u32 },

    /// The length token or payload violates the framing rules
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// A data frame could not be turned into a record of the negotiated arity
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    /// A data frame was requested before the handshake completed
    #[error("Handshake has not completed")]
    HandshakeRequired,

    /// The handshake frame was not a usable variable list
    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    /// The channel has been closed
    #[error("Channel is not connected")]
    NotConnected,

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StreamError {
    /// Whether this error ends the session
    ///
    /// Timeouts and malformed records are local to a single receive; everything
    /// else leaves the stream unusable.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            StreamError::ReceiveTimeoutExceeded { .. } | StreamError::MalformedRecord(_)
        )
    }
}

pub type StreamResult<T> = std::result::Result<T, StreamError>;

/// Errors raised while driving the background ingest pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The worker did not stop within the join timeout
    #[error("Pipeline worker did not stop within {0:?}")]
    JoinTimeout(Duration),

    /// The worker thread panicked
    #[error("Pipeline worker panicked")]
    WorkerPanicked,

    /// The worker has already been joined
    #[error("Pipeline worker already joined")]
    AlreadyJoined,

    /// The worker thread could not be spawned
    #[error("Failed to spawn pipeline worker: {0}")]
    Spawn(#[source] std::io::Error),
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
