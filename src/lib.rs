//! # DataVis-Ingest: Data sources for the data visualizer
//!
//! Plot widgets consume records through a single [`DataCursor`] regardless of
//! where the data lives. Three backends sit behind it:
//!
//! - **Relational**: the first table of an SQLite database
//! - **Delimited**: a comma-separated file with header rows and a sibling
//!   `<stem>_descr.<ext>` description file
//! - **Streaming**: a live TCP peer speaking a length-prefixed text protocol,
//!   received by a background worker into a bounded queue
//!
//! ## Architecture
//!
//! - **Stream**: framing, the single-connection TCP channel and the ingest
//!   pipeline (see [`stream`])
//! - **Source**: the cursor and its backends (see [`source`])
//! - **Communication**: Crossbeam channels between the worker and the consumer
//!
//! ## Configuration
//!
//! Settings are read from JSON or TOML (see [`config`]). The default file lives
//! in the platform data directory under `dev.hxyulin.datavis-ingest`.
//!
//! ## Example
//!
//! ```ignore
//! use datavis_ingest::{config::IngestConfig, DataCursor, SourceSpec};
//!
//! fn main() -> datavis_ingest::Result<()> {
//!     let config = IngestConfig::load_or_default();
//!     let spec: SourceSpec = "csv:elnino.csv".parse().map_err(datavis_ingest::IngestError::Config)?;
//!
//!     let mut cursor = DataCursor::open(&spec, &config)?;
//!     println!("{:?}", cursor.describe().labels());
//!     for record in cursor.records() {
//!         println!("{}", record?);
//!     }
//!     cursor.close()?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod source;
pub mod stream;
pub mod types;

// Re-export commonly used types
pub use config::IngestConfig;
pub use error::{IngestError, Result};
pub use source::{CursorError, DataCursor, RecordSource, SourceKind, SourceSpec};
pub use stream::{Channel, IngestPipeline, PollOutcome};
pub use types::{LegendEntry, Record, SourceDescription, VariableDescriptor, VariableKind};
