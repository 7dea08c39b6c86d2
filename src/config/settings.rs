//! Per-backend settings
//!
//! Each source backend reads its tunables from one section of
//! [`IngestConfig`](super::IngestConfig). All fields have defaults, so a config
//! file only needs to name what it changes.
//!
//! # Sections
//!
//! - [`StreamConfig`] - Socket timeouts, retry budget, queue sizing and shutdown bounds
//! - [`DelimitedConfig`] - Delimiter, missing-value marker and description file naming
//! - [`RelationalConfig`] - Description table name, numeric type lookup and scan batch size
//!
//! # Shutdown latency
//!
//! A streaming worker notices a shutdown request only between receives, so the
//! worst-case latency is `retry_budget * read_timeout`. The default
//! `join_timeout_ms` leaves a margin above that product.

use crate::stream::framing::{DEFAULT_MAX_FRAME_LEN, DEFAULT_RETRY_BUDGET};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default per-read socket timeout in milliseconds
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 2000;

/// Default capacity of the record queue between worker and consumer
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Default number of non-blocking dequeue attempts per poll
pub const DEFAULT_POLL_ATTEMPTS: u32 = 16;

/// Default rows fetched per relational scan query
pub const DEFAULT_SCAN_BATCH: usize = 256;

/// Settings for streaming sources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Per-read socket timeout in milliseconds
    pub read_timeout_ms: u64,

    /// Timed-out reads tolerated before a receive fails
    pub retry_budget: u32,

    /// Listen backlog. A listening channel accepts exactly one connection.
    pub listen_backlog: u32,

    /// Capacity of the bounded record queue
    pub queue_capacity: usize,

    /// Non-blocking dequeue attempts per `next()` on a streaming cursor
    pub poll_attempts: u32,

    /// How long `close()` waits for the worker to stop
    pub join_timeout_ms: u64,

    /// Largest accepted frame payload in bytes
    pub max_frame_len: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            retry_budget: DEFAULT_RETRY_BUDGET,
            listen_backlog: 1,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            poll_attempts: DEFAULT_POLL_ATTEMPTS,
            join_timeout_ms: DEFAULT_READ_TIMEOUT_MS * DEFAULT_RETRY_BUDGET as u64 + 5000,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

impl StreamConfig {
    /// Per-read socket timeout
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms.max(1))
    }

    /// Bound on waiting for the worker to stop
    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    /// Worst-case time for the worker to notice a shutdown request
    pub fn shutdown_latency(&self) -> Duration {
        self.read_timeout() * self.retry_budget.max(1)
    }
}

/// Settings for delimited-file sources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelimitedConfig {
    /// Field delimiter
    pub delimiter: char,

    /// Token marking a missing value; rows containing it are dropped
    pub missing_marker: String,

    /// Suffix appended to the file stem to find the description file
    pub descr_suffix: String,

    /// Header rows at the top of the data file (labels, kind flags)
    pub header_rows: usize,
}

impl Default for DelimitedConfig {
    fn default() -> Self {
        Self {
            delimiter: ',',
            missing_marker: "?".to_string(),
            descr_suffix: "_descr".to_string(),
            header_rows: 2,
        }
    }
}

impl DelimitedConfig {
    /// The delimiter as a single byte, falling back to `,` for non-ASCII input
    pub fn delimiter_byte(&self) -> u8 {
        if self.delimiter.is_ascii() {
            self.delimiter as u8
        } else {
            b','
        }
    }
}

/// Settings for relational sources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationalConfig {
    /// Name of the optional table holding units and legends
    pub descr_table: String,

    /// Declared column types treated as numeric (lower case, without size suffix)
    pub numeric_type_names: Vec<String>,

    /// Rows fetched per scan query; bounds the rows a cursor holds at once
    pub scan_batch: usize,
}

impl Default for RelationalConfig {
    fn default() -> Self {
        Self {
            descr_table: "descr".to_string(),
            numeric_type_names: [
                "float",
                "real",
                "double precision",
                "double",
                "int",
                "integer",
                "smallint",
                "bigint",
                "tinyint",
                "mediumint",
                "decimal",
                "numeric",
                "dec",
                "fixed",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            scan_batch: DEFAULT_SCAN_BATCH,
        }
    }
}

impl RelationalConfig {
    /// Classify a declared column type such as `DECIMAL(10,2)` or `int unsigned`
    pub fn is_numeric_type(&self, declared: &str) -> bool {
        let lowered = declared.to_ascii_lowercase();
        let base = lowered.split('(').next().unwrap_or("").trim();
        let base = base.strip_suffix(" unsigned").unwrap_or(base).trim();
        self.numeric_type_names.iter().any(|t| t == base)
    }

    /// Scan batch size, at least one row
    pub fn scan_batch(&self) -> usize {
        self.scan_batch.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_defaults() {
        let config = StreamConfig::default();
        assert_eq!(config.read_timeout(), Duration::from_secs(2));
        assert_eq!(config.retry_budget, 10);
        assert_eq!(config.listen_backlog, 1);
        assert_eq!(config.shutdown_latency(), Duration::from_secs(20));
        assert!(config.join_timeout() > config.shutdown_latency());
    }

    #[test]
    fn test_delimiter_byte() {
        let mut config = DelimitedConfig::default();
        assert_eq!(config.delimiter_byte(), b',');
        config.delimiter = ';';
        assert_eq!(config.delimiter_byte(), b';');
        config.delimiter = 'é';
        assert_eq!(config.delimiter_byte(), b',');
    }

    #[test]
    fn test_numeric_type_lookup() {
        let config = RelationalConfig::default();
        assert!(config.is_numeric_type("INTEGER"));
        assert!(config.is_numeric_type("decimal(10,2)"));
        assert!(config.is_numeric_type("int unsigned"));
        assert!(config.is_numeric_type("DOUBLE PRECISION"));
        assert!(!config.is_numeric_type("varchar(20)"));
        assert!(!config.is_numeric_type("TEXT"));
        assert!(!config.is_numeric_type(""));
    }

    #[test]
    fn test_scan_batch_is_at_least_one() {
        let mut config = RelationalConfig::default();
        assert_eq!(config.scan_batch(), DEFAULT_SCAN_BATCH);
        config.scan_batch = 0;
        assert_eq!(config.scan_batch(), 1);
    }
}
