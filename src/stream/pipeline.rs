//! Background ingest pipeline
//!
//! The pipeline decouples socket I/O from consumption. One worker thread
//! receives records and pushes them onto a bounded queue; the consumer drains
//! the queue with non-blocking [`IngestPipeline::poll`] calls, typically from a
//! UI redraw timer that must never stall.
//!
//! # State Machine
//!
//! ```text
//! Running --request_shutdown--> ShuttingDown --worker exits--> Stopped
//! Running --connection closed--------------------------------> Stopped
//! ```
//!
//! # Coordination
//!
//! - **Record queue**: `crossbeam_channel::bounded`, single producer and single
//!   consumer. A full queue blocks the worker; records are never dropped.
//! - **Exit signal**: a write-once slot holding either a shutdown request (from
//!   the consumer) or the closed sentinel (from the worker). The worker checks
//!   it between receives, so shutdown latency is bounded by one receive's retry
//!   budget.
//! - **Join**: the worker holds the only sender of a completion channel. Its
//!   disconnection marks the end of the thread, which lets [`IngestPipeline::join`]
//!   wait with a real timeout.

use crate::stream::channel::Channel;
use crate::stream::error::{PipelineError, PipelineResult, StreamError, StreamResult};
use crate::types::Record;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Source of records driven by the pipeline worker
pub trait RecordReceiver {
    /// Block until one record is available
    fn receive_record(&mut self) -> StreamResult<Record>;

    /// Release the underlying transport
    fn close(&mut self) {}
}

impl RecordReceiver for Channel {
    fn receive_record(&mut self) -> StreamResult<Record> {
        Channel::receive_record(self)
    }

    fn close(&mut self) {
        Channel::close(self)
    }
}

/// Lifecycle state of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Worker is receiving
    Running,
    /// Shutdown requested, worker has not exited yet
    ShuttingDown,
    /// Worker has exited
    Stopped,
}

impl PipelineState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => PipelineState::Running,
            1 => PipelineState::ShuttingDown,
            _ => PipelineState::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            PipelineState::Running => 0,
            PipelineState::ShuttingDown => 1,
            PipelineState::Stopped => 2,
        }
    }
}

/// What was written into the exit signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The consumer asked the worker to stop
    Shutdown,
    /// The connection ended; no more records will arrive
    Closed,
}

/// Result of a non-blocking poll
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The next record in wire order
    Record(Record),
    /// The source is closed and every record has been delivered
    Exhausted,
    /// Nothing available yet
    TryLater,
}

const SLOT_EMPTY: u8 = 0;
const SLOT_SHUTDOWN: u8 = 1;
const SLOT_CLOSED: u8 = 2;

/// Write-once exit slot shared by worker and consumer
#[derive(Debug, Default)]
pub struct ExitSignal {
    slot: AtomicU8,
}

impl ExitSignal {
    /// Write `reason` if the slot is still empty. Returns whether it was written.
    pub fn raise(&self, reason: ExitReason) -> bool {
        let value = match reason {
            ExitReason::Shutdown => SLOT_SHUTDOWN,
            ExitReason::Closed => SLOT_CLOSED,
        };
        self.slot
            .compare_exchange(SLOT_EMPTY, value, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Read the slot without consuming it
    pub fn peek(&self) -> Option<ExitReason> {
        match self.slot.load(Ordering::Acquire) {
            SLOT_SHUTDOWN => Some(ExitReason::Shutdown),
            SLOT_CLOSED => Some(ExitReason::Closed),
            _ => None,
        }
    }
}

/// Counters maintained by the worker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Records received and enqueued
    pub received: u64,
    /// Frames dropped because they did not parse as a record
    pub malformed: u64,
    /// Receives that exhausted their retry budget
    pub timeouts: u64,
}

#[derive(Debug, Default)]
struct Shared {
    exit: ExitSignal,
    state: AtomicU8,
    received: AtomicU64,
    malformed: AtomicU64,
    timeouts: AtomicU64,
}

impl Shared {
    fn state(&self) -> PipelineState {
        PipelineState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: PipelineState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }
}

/// Marks the pipeline stopped when the worker exits, including by panic
struct StopGuard(Arc<Shared>);

impl Drop for StopGuard {
    fn drop(&mut self) {
        self.0.set_state(PipelineState::Stopped);
    }
}

/// Handle to a running ingest worker
#[derive(Debug)]
pub struct IngestPipeline {
    shared: Arc<Shared>,
    records: Option<Receiver<Record>>,
    done: Receiver<()>,
    handle: Option<JoinHandle<()>>,
    capacity: usize,
}

impl IngestPipeline {
    /// Spawn the worker over `source` with a queue of `capacity` records
    pub fn start<S>(source: S, capacity: usize) -> PipelineResult<Self>
    where
        S: RecordReceiver + Send + 'static,
    {
        let capacity = capacity.max(1);
        let (record_tx, record_rx) = bounded(capacity);
        let (done_tx, done_rx) = bounded::<()>(1);
        let shared = Arc::new(Shared::default());

        let worker_shared = shared.clone();
        let handle = std::thread::Builder::new()
            .name("ingest-worker".to_string())
            .spawn(move || {
                let _done = done_tx;
                let _guard = StopGuard(worker_shared.clone());
                run_worker(source, record_tx, &worker_shared);
            })
            .map_err(PipelineError::Spawn)?;

        tracing::info!("Ingest pipeline started (queue capacity {})", capacity);

        Ok(Self {
            shared,
            records: Some(record_rx),
            done: done_rx,
            handle: Some(handle),
            capacity,
        })
    }

    /// Current lifecycle state
    pub fn state(&self) -> PipelineState {
        self.shared.state()
    }

    /// Contents of the exit signal
    pub fn exit_reason(&self) -> Option<ExitReason> {
        self.shared.exit.peek()
    }

    /// Snapshot of the worker counters
    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            received: self.shared.received.load(Ordering::Relaxed),
            malformed: self.shared.malformed.load(Ordering::Relaxed),
            timeouts: self.shared.timeouts.load(Ordering::Relaxed),
        }
    }

    /// Queue capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records currently waiting in the queue
    pub fn queued(&self) -> usize {
        self.records.as_ref().map(|rx| rx.len()).unwrap_or(0)
    }

    /// Ask the worker to stop after its current receive
    pub fn request_shutdown(&self) {
        if self.shared.exit.raise(ExitReason::Shutdown) {
            let _ = self.shared.state.compare_exchange(
                PipelineState::Running.as_u8(),
                PipelineState::ShuttingDown.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            );
            tracing::debug!("Ingest pipeline shutdown requested");
        }
    }

    /// Try up to `max_attempts` non-blocking dequeues
    ///
    /// Never blocks. Records enqueued before the closed sentinel are always
    /// delivered before [`PollOutcome::Exhausted`].
    pub fn poll(&self, max_attempts: u32) -> PollOutcome {
        let Some(rx) = self.records.as_ref() else {
            return PollOutcome::Exhausted;
        };

        for _ in 0..max_attempts.max(1) {
            match rx.try_recv() {
                Ok(record) => return PollOutcome::Record(record),
                Err(TryRecvError::Disconnected) => return PollOutcome::Exhausted,
                Err(TryRecvError::Empty) => {
                    if self.shared.exit.peek() == Some(ExitReason::Closed) {
                        return match rx.try_recv() {
                            Ok(record) => PollOutcome::Record(record),
                            Err(_) => PollOutcome::Exhausted,
                        };
                    }
                    std::hint::spin_loop();
                }
            }
        }

        PollOutcome::TryLater
    }

    /// Wait up to `timeout` for the worker thread to finish
    pub fn join(&mut self, timeout: Duration) -> PipelineResult<()> {
        let handle = self.handle.take().ok_or(PipelineError::AlreadyJoined)?;

        if let Err(RecvTimeoutError::Timeout) = self.done.recv_timeout(timeout) {
            tracing::warn!("Ingest worker still running after {:?}", timeout);
            self.handle = Some(handle);
            return Err(PipelineError::JoinTimeout(timeout));
        }

        handle.join().map_err(|_| PipelineError::WorkerPanicked)
    }

    /// Request shutdown, release the queue and join within `timeout`
    ///
    /// Dropping the queue unblocks a worker waiting on a full queue.
    pub fn shutdown(&mut self, timeout: Duration) -> PipelineResult<()> {
        self.request_shutdown();
        self.records = None;
        match self.join(timeout) {
            Err(PipelineError::AlreadyJoined) => Ok(()),
            other => other,
        }
    }
}

impl Drop for IngestPipeline {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.request_shutdown();
            self.records = None;
            tracing::debug!("Ingest pipeline dropped without join; worker detached");
        }
    }
}

/// Worker loop: receive, enqueue, repeat until shutdown or a fatal error
fn run_worker<S: RecordReceiver>(mut source: S, records: Sender<Record>, shared: &Shared) {
    tracing::info!("Ingest worker started");

    loop {
        if shared.exit.peek() == Some(ExitReason::Shutdown) {
            tracing::debug!("Ingest worker observed shutdown request");
            break;
        }

        match source.receive_record() {
            Ok(record) => {
                if records.send(record).is_err() {
                    tracing::debug!("Record queue dropped by consumer");
                    break;
                }
                shared.received.fetch_add(1, Ordering::Relaxed);
            }
            Err(StreamError::ReceiveTimeoutExceeded { attempts }) => {
                shared.timeouts.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("No data after {} attempts, still listening", attempts);
            }
            Err(StreamError::MalformedRecord(reason)) => {
                shared.malformed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Dropping malformed record: {}", reason);
            }
            Err(StreamError::ConnectionClosed) => {
                tracing::info!("Connection closed by peer");
                shared.exit.raise(ExitReason::Closed);
                break;
            }
            Err(e) => {
                tracing::error!("Ingest worker stopping: {}", e);
                shared.exit.raise(ExitReason::Closed);
                break;
            }
        }
    }

    source.close();
    tracing::info!("Ingest worker stopped");
}
