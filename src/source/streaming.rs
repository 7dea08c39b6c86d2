//! Streaming backend over a live TCP channel
//!
//! Opening performs the handshake synchronously, then hands the channel to an
//! [`IngestPipeline`] whose worker keeps receiving in the background. Reads
//! never block: an empty queue is reported as [`CursorError::EndOfSource`] and
//! the caller retries on its next refresh.

use super::{CursorError, CursorResult, RecordSource, SourceKind};
use crate::config::StreamConfig;
use crate::stream::{Channel, ChannelShutdown, IngestPipeline, PipelineStats, PollOutcome};
use crate::types::{Record, SourceDescription};
use std::net::ToSocketAddrs;
use std::time::Duration;

/// Cursor backend fed by a background ingest pipeline
///
/// Not rewindable and not copyable.
pub struct StreamingSource {
    pipeline: Option<IngestPipeline>,
    shutdown: Option<ChannelShutdown>,
    description: SourceDescription,
    poll_attempts: u32,
    join_timeout: Duration,
    exhausted: bool,
}

impl std::fmt::Debug for StreamingSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingSource")
            .field("arity", &self.description.arity())
            .field("running", &self.pipeline.is_some())
            .field("exhausted", &self.exhausted)
            .finish()
    }
}

impl StreamingSource {
    /// Accept one connection on `port` and start ingesting
    pub fn listen(port: u16, config: &StreamConfig) -> CursorResult<Self> {
        Self::from_channel(Channel::listen(port, config)?, config)
    }

    /// Connect to `address` and start ingesting
    pub fn dial<A: ToSocketAddrs>(address: A, config: &StreamConfig) -> CursorResult<Self> {
        Self::from_channel(Channel::dial(address, config)?, config)
    }

    /// Handshake on an established channel and start the pipeline
    pub fn from_channel(mut channel: Channel, config: &StreamConfig) -> CursorResult<Self> {
        let (_, names) = channel.handshake()?;
        let shutdown = channel.shutdown_handle()?;
        let description = SourceDescription::all_numeric(names.as_slice());
        let pipeline = IngestPipeline::start(channel, config.queue_capacity)?;

        tracing::info!("Streaming source ready: {}", names.join(", "));

        Ok(Self {
            pipeline: Some(pipeline),
            shutdown: Some(shutdown),
            description,
            poll_attempts: config.poll_attempts,
            join_timeout: config.join_timeout(),
            exhausted: false,
        })
    }

    /// Worker counters, if the pipeline is still attached
    pub fn stats(&self) -> Option<PipelineStats> {
        self.pipeline.as_ref().map(IngestPipeline::stats)
    }
}

impl RecordSource for StreamingSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Streaming
    }

    fn description(&self) -> &SourceDescription {
        &self.description
    }

    fn next_record(&mut self) -> CursorResult<Record> {
        if self.exhausted {
            return Err(CursorError::SourceClosed);
        }
        let pipeline = self.pipeline.as_ref().ok_or(CursorError::SourceClosed)?;

        match pipeline.poll(self.poll_attempts) {
            PollOutcome::Record(record) => Ok(record),
            PollOutcome::TryLater => Err(CursorError::EndOfSource),
            PollOutcome::Exhausted => {
                tracing::info!("Stream exhausted");
                self.exhausted = true;
                Err(CursorError::EndOfSource)
            }
        }
    }

    fn rewind(&mut self) -> CursorResult<()> {
        Ok(())
    }

    fn try_copy(&self) -> CursorResult<Box<dyn RecordSource + Send>> {
        Err(CursorError::NotCopyable(SourceKind::Streaming))
    }

    fn close(&mut self) -> CursorResult<()> {
        let Some(mut pipeline) = self.pipeline.take() else {
            return Ok(());
        };

        pipeline.request_shutdown();
        if let Some(shutdown) = self.shutdown.take() {
            shutdown.shutdown();
        }
        pipeline.shutdown(self.join_timeout)?;
        tracing::debug!("Streaming source closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;
    use std::time::Instant;

    fn fast_config() -> StreamConfig {
        StreamConfig {
            read_timeout_ms: 20,
            retry_budget: 100,
            join_timeout_ms: 5000,
            ..StreamConfig::default()
        }
    }

    /// Dial a fresh listener; the peer thread gets the accepted channel
    fn with_peer<F>(peer: F) -> (StreamingSource, thread::JoinHandle<()>)
    where
        F: FnOnce(Channel) + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let channel = Channel::accept_one(listener, &fast_config()).unwrap();
            peer(channel);
        });
        let source = StreamingSource::dial(addr, &fast_config()).unwrap();
        (source, handle)
    }

    fn next_within(source: &mut StreamingSource, limit: Duration) -> CursorResult<Record> {
        let deadline = Instant::now() + limit;
        loop {
            match source.next_record() {
                Err(CursorError::EndOfSource) if Instant::now() < deadline => {
                    thread::sleep(Duration::from_millis(5));
                }
                other => return other,
            }
        }
    }

    #[test]
    fn test_records_then_end_then_closed() {
        let (mut source, peer) = with_peer(|mut channel| {
            channel.send_handshake(&["temp", "pressure"]).unwrap();
            channel.send_record(&Record::new(vec![1.0, 2.0])).unwrap();
            channel.close();
        });

        assert_eq!(source.description().labels(), vec!["temp", "pressure"]);
        let record = next_within(&mut source, Duration::from_secs(5)).unwrap();
        assert_eq!(record.values(), &[1.0, 2.0]);

        // Poll until the closed connection is observed
        let deadline = Instant::now() + Duration::from_secs(5);
        while !source.exhausted && Instant::now() < deadline {
            let _ = source.next_record();
            thread::sleep(Duration::from_millis(5));
        }
        assert!(source.exhausted);
        assert!(matches!(source.next_record(), Err(CursorError::SourceClosed)));

        peer.join().unwrap();
        source.close().unwrap();
    }

    #[test]
    fn test_rewind_is_noop_and_copy_fails() {
        let (mut source, peer) = with_peer(|mut channel| {
            channel.send_handshake(&["a"]).unwrap();
            channel.send_record(&Record::new(vec![7.0])).unwrap();
            thread::sleep(Duration::from_millis(200));
        });

        assert_eq!(
            next_within(&mut source, Duration::from_secs(5)).unwrap().values(),
            &[7.0]
        );
        source.rewind().unwrap();
        assert!(matches!(
            source.try_copy(),
            Err(CursorError::NotCopyable(SourceKind::Streaming))
        ));

        source.close().unwrap();
        peer.join().unwrap();
    }

    #[test]
    fn test_close_stops_worker_promptly() {
        let (mut source, peer) = with_peer(|mut channel| {
            channel.send_handshake(&["a", "b"]).unwrap();
            thread::sleep(Duration::from_millis(500));
        });

        let started = Instant::now();
        source.close().unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
        source.close().unwrap();
        assert!(matches!(source.next_record(), Err(CursorError::SourceClosed)));
        assert!(source.stats().is_none());

        peer.join().unwrap();
    }

    #[test]
    fn test_handshake_failure_is_fatal() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let peer = thread::spawn(move || {
            let mut channel = Channel::accept_one(listener, &fast_config()).unwrap();
            channel.close();
        });

        let result = StreamingSource::dial(addr, &fast_config());
        assert!(matches!(result, Err(CursorError::Stream(_))));
        peer.join().unwrap();
    }
}
