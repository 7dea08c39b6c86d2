//! Streaming transport: framing, TCP channel and the background pipeline
//!
//! Data flows leaf-first through three layers:
//!
//! - [`framing`] - Length-prefixed text frames on a byte stream
//! - [`channel`] - One TCP session: handshake, then one record per frame
//! - [`pipeline`] - Worker thread feeding a bounded queue the consumer polls
//!
//! # Example
//!
//! ```ignore
//! use datavis_ingest::config::StreamConfig;
//! use datavis_ingest::stream::{Channel, IngestPipeline, PollOutcome};
//!
//! let config = StreamConfig::default();
//! let mut channel = Channel::listen(5000, &config)?;
//! let (count, names) = channel.handshake()?;
//!
//! let pipeline = IngestPipeline::start(channel, config.queue_capacity)?;
//! match pipeline.poll(config.poll_attempts) {
//!     PollOutcome::Record(record) => println!("{}", record),
//!     PollOutcome::TryLater => {}
//!     PollOutcome::Exhausted => println!("stream closed"),
//! }
//! ```

pub mod channel;
pub mod error;
pub mod framing;
pub mod pipeline;

pub use channel::{Channel, ChannelRole, ChannelShutdown};
pub use error::{PipelineError, PipelineResult, StreamError, StreamResult};
pub use framing::{encode_frame, write_frame, FrameReader};
pub use pipeline::{
    ExitReason, ExitSignal, IngestPipeline, PipelineState, PipelineStats, PollOutcome,
    RecordReceiver,
};
