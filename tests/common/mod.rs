//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use datavis_ingest::config::StreamConfig;
use datavis_ingest::{CursorError, DataCursor, Record};
use std::time::{Duration, Instant};

/// Upper bound for anything a test waits on
pub fn test_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Stream settings with short reads so tests finish quickly
pub fn fast_stream_config() -> StreamConfig {
    StreamConfig {
        read_timeout_ms: 20,
        retry_budget: 100,
        join_timeout_ms: 5000,
        ..StreamConfig::default()
    }
}

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}

/// Read every record until end of source
pub fn drain(cursor: &mut DataCursor) -> Vec<Vec<f64>> {
    cursor
        .records()
        .map(|r| r.expect("cursor error").into_values())
        .collect()
}

/// Poll a streaming cursor until it yields a record or `timeout` passes
pub fn next_within(cursor: &mut DataCursor, timeout: Duration) -> Result<Record, CursorError> {
    let deadline = Instant::now() + timeout;
    loop {
        match cursor.next_record() {
            Err(CursorError::EndOfSource) if Instant::now() < deadline => {
                std::thread::sleep(Duration::from_millis(5));
            }
            other => return other,
        }
    }
}

/// Poll a streaming cursor until it reports the source closed
///
/// Returns every record received along the way.
pub fn collect_until_closed(cursor: &mut DataCursor, timeout: Duration) -> Vec<Vec<f64>> {
    let deadline = Instant::now() + timeout;
    let mut records = Vec::new();
    while Instant::now() < deadline {
        match cursor.next_record() {
            Ok(record) => records.push(record.into_values()),
            Err(CursorError::EndOfSource) => std::thread::sleep(Duration::from_millis(5)),
            Err(CursorError::SourceClosed) => return records,
            Err(e) => panic!("unexpected cursor error: {}", e),
        }
    }
    panic!("stream did not close within {:?}", timeout);
}
