//! Transaction Logger
//!
//! Turns concurrent `record_*` calls into a strictly ordered, durable log,
//! and replays that log on startup.
//!
//! ## Pipeline
//! ```text
//!  handler ─┐                          ┌──────────────┐
//!  handler ─┼─► [seq++ ; send] ─► MPSC ─►│ writer thread │─► transaction.log
//!  handler ─┘   (one short lock)       └──────────────┘
//! ```
//!
//! Sequence assignment and enqueue happen under the same lock, so queue
//! order is sequence order. The single writer drains the queue in FIFO order,
//! which makes file order equal to acceptance order.
//!
//! ## Lifecycle
//! `open` → `replay` (optional, at most once) → `start` → `record_*`/`flush`
//! → `close`.
//!
//! The file is only opened for writing in `start`, after replay has seen it
//! as it was left on disk; that is also where a partial trailing record is
//! cut off. `start` ends any replay still in progress.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;

use super::reader::{self, LogReader, ReplayStats};
use super::{Event, LogWriter};
use crate::config::WalSyncStrategy;
use crate::error::{KvError, Result};

/// Work items for the writer thread
enum Message {
    Event(Event),

    /// Rendezvous: acknowledged once everything queued before it is on disk
    Flush(Sender<()>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Created,
    Replayed,
    Running,
    Closed,
}

/// State touched by every enqueue. Held only for counter bump + channel send.
struct Intake {
    phase: Phase,
    last_sequence: u64,

    /// Set once a full replay (or priming scan) has observed the end of the log
    primed: bool,

    /// Dropped on close; the writer exits once the queue is drained
    sender: Option<Sender<Message>>,
}

struct Shared {
    path: PathBuf,
    intake: Mutex<Intake>,
    failed: AtomicBool,
    error: Mutex<Option<KvError>>,
}

impl Shared {
    /// Record a fatal write error. The first one wins.
    fn fail(&self, error: KvError) {
        self.failed.store(true, Ordering::SeqCst);
        let mut slot = self.error.lock();
        if slot.is_none() {
            *slot = Some(error);
        }
    }
}

struct Worker {
    /// Queue consumer, handed to the writer thread on `start`
    pending: Option<Receiver<Message>>,
    handle: Option<JoinHandle<()>>,
}

/// Durable, ordered append pipeline plus replay for one log file
pub struct TransactionLogger {
    shared: Arc<Shared>,
    sync_strategy: WalSyncStrategy,
    worker: Mutex<Worker>,
}

impl TransactionLogger {
    /// Open (creating if needed) the log at `path`.
    ///
    /// Nothing is written, and an existing file is not modified, until
    /// `start` is called.
    pub fn open(path: &Path, sync_strategy: WalSyncStrategy) -> Result<Self> {
        OpenOptions::new().create(true).append(true).open(path)?;
        let (sender, receiver) = channel::unbounded();

        Ok(Self {
            shared: Arc::new(Shared {
                path: path.to_path_buf(),
                intake: Mutex::new(Intake {
                    phase: Phase::Created,
                    last_sequence: 0,
                    primed: false,
                    sender: Some(sender),
                }),
                failed: AtomicBool::new(false),
                error: Mutex::new(None),
            }),
            sync_strategy,
            worker: Mutex::new(Worker {
                pending: Some(receiver),
                handle: None,
            }),
        })
    }

    // =========================================================================
    // Replay
    // =========================================================================

    /// Read the existing log front to back.
    ///
    /// Allowed once, before `start`. Consuming the returned iterator to the
    /// end primes the sequence counter so numbering continues after the last
    /// record.
    pub fn replay(&self) -> Result<Replay> {
        {
            let mut intake = self.shared.intake.lock();
            match intake.phase {
                Phase::Created => intake.phase = Phase::Replayed,
                Phase::Replayed => {
                    return Err(KvError::InvalidState("replay already performed".into()))
                }
                Phase::Running => {
                    return Err(KvError::InvalidState(
                        "cannot replay while the pipeline is running".into(),
                    ))
                }
                Phase::Closed => return Err(KvError::LoggerClosed),
            }
        }

        let reader = match LogReader::open(&self.shared.path) {
            Ok(reader) => Some(reader),
            Err(KvError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e),
        };

        tracing::debug!(path = %self.shared.path.display(), "replaying transaction log");

        Ok(Replay {
            reader,
            shared: Arc::clone(&self.shared),
            stats: ReplayStats::default(),
            state: ReplayState::Reading,
        })
    }

    // =========================================================================
    // Pipeline
    // =========================================================================

    /// Start the writer thread. Must be called exactly once, before any
    /// traffic.
    ///
    /// If no complete replay primed the sequence counter, the log is scanned
    /// first so new events never reuse a sequence number. The scan and the
    /// tail repair run without holding the enqueue lock. A replay iterator
    /// that is still alive stops yielding events once this returns.
    pub fn start(&self) -> Result<()> {
        // Serializes start against close
        let mut worker = self.worker.lock();

        let primed = {
            let intake = self.shared.intake.lock();
            match intake.phase {
                Phase::Created | Phase::Replayed => {}
                Phase::Running => {
                    return Err(KvError::InvalidState("pipeline already started".into()))
                }
                Phase::Closed => return Err(KvError::LoggerClosed),
            }
            intake.primed
        };

        let scanned = if primed {
            None
        } else {
            Some(reader::verify(&self.shared.path)?)
        };

        let writer = LogWriter::open(&self.shared.path, self.sync_strategy)?;
        let receiver = worker
            .pending
            .take()
            .ok_or_else(|| KvError::InvalidState("writer already taken".into()))?;

        let mut intake = self.shared.intake.lock();
        if let Some(stats) = scanned {
            intake.last_sequence = intake.last_sequence.max(stats.last_sequence);
            intake.primed = true;
        }
        intake.phase = Phase::Running;

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("durakv-log-writer".into())
            .spawn(move || run_writer(writer, receiver, shared));
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                // No writer: refuse everything from here on
                intake.phase = Phase::Closed;
                intake.sender = None;
                return Err(e.into());
            }
        };
        worker.handle = Some(handle);

        tracing::debug!(
            last_sequence = intake.last_sequence,
            "transaction log pipeline started"
        );
        Ok(())
    }

    /// Queue a PUT. Returns the assigned sequence number.
    ///
    /// Never waits on disk I/O. Write failures surface later through
    /// `flush`, `take_error` and `has_failed`.
    pub fn record_put(&self, key: &str, value: &str) -> Result<u64> {
        self.enqueue(key, |sequence| Event::put(sequence, key, value))
    }

    /// Queue a DELETE. Returns the assigned sequence number.
    pub fn record_delete(&self, key: &str) -> Result<u64> {
        self.enqueue(key, |sequence| Event::delete(sequence, key))
    }

    fn enqueue(&self, key: &str, build: impl FnOnce(u64) -> Event) -> Result<u64> {
        if key.is_empty() {
            return Err(KvError::EmptyKey);
        }
        if self.has_failed() {
            return Err(KvError::LoggerFailed);
        }

        let mut intake = self.shared.intake.lock();
        match intake.phase {
            Phase::Running => {}
            Phase::Closed => return Err(KvError::LoggerClosed),
            Phase::Created | Phase::Replayed => {
                return Err(KvError::InvalidState("pipeline not started".into()))
            }
        }

        let sequence = intake.last_sequence + 1;
        let sender = intake.sender.as_ref().ok_or(KvError::LoggerClosed)?;
        sender
            .send(Message::Event(build(sequence)))
            .map_err(|_| KvError::LoggerClosed)?;
        intake.last_sequence = sequence;

        Ok(sequence)
    }

    /// Block until every event accepted so far is written and synced, or
    /// the pipeline has failed.
    pub fn flush(&self) -> Result<()> {
        let (ack_tx, ack_rx) = channel::bounded(1);
        {
            let intake = self.shared.intake.lock();
            match intake.phase {
                Phase::Running => {}
                Phase::Closed => return Err(KvError::LoggerClosed),
                // Nothing can have been queued yet
                Phase::Created | Phase::Replayed => return Ok(()),
            }
            let sender = intake.sender.as_ref().ok_or(KvError::LoggerClosed)?;
            sender
                .send(Message::Flush(ack_tx))
                .map_err(|_| KvError::LoggerFailed)?;
        }

        ack_rx.recv().map_err(|_| KvError::LoggerFailed)?;

        if self.has_failed() {
            return Err(KvError::LoggerFailed);
        }
        Ok(())
    }

    /// Stop accepting events, drain the queue and close the file.
    ///
    /// Calling it again is a no-op.
    pub fn close(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        {
            let mut intake = self.shared.intake.lock();
            if intake.phase == Phase::Closed {
                return Ok(());
            }
            intake.phase = Phase::Closed;
            intake.sender = None;
        }

        // Never started: nothing was queued, just release the file
        worker.pending = None;

        if let Some(handle) = worker.handle.take() {
            handle
                .join()
                .map_err(|_| KvError::InvalidState("log writer thread panicked".into()))?;
        }

        tracing::debug!(
            last_sequence = self.last_sequence(),
            "transaction log closed"
        );

        if self.has_failed() {
            return Err(KvError::LoggerFailed);
        }
        Ok(())
    }

    // =========================================================================
    // Error slot & accessors
    // =========================================================================

    /// Whether a write has failed. Once true, it stays true.
    pub fn has_failed(&self) -> bool {
        self.shared.failed.load(Ordering::SeqCst)
    }

    /// Take the first recorded write failure, if any.
    pub fn take_error(&self) -> Option<KvError> {
        self.shared.error.lock().take()
    }

    /// Highest sequence number assigned so far
    pub fn last_sequence(&self) -> u64 {
        self.shared.intake.lock().last_sequence
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }
}

impl Drop for TransactionLogger {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::error!(error = %e, "transaction log did not close cleanly");
        }
    }
}

// =============================================================================
// Writer thread
// =============================================================================

fn run_writer(mut writer: LogWriter, receiver: Receiver<Message>, shared: Arc<Shared>) {
    let mut failed = false;
    let mut last_written = 0u64;
    let mut dropped = 0u64;

    // Ends once the intake sender is dropped and the queue is empty
    for message in receiver.iter() {
        match message {
            Message::Event(event) => {
                if failed {
                    dropped += 1;
                    continue;
                }
                if let Err(source) = writer.write_event(&event) {
                    tracing::error!(
                        sequence = event.sequence,
                        error = %source,
                        "transaction log write failed; no further events will be written"
                    );
                    shared.fail(KvError::LogWrite {
                        sequence: event.sequence,
                        source,
                    });
                    failed = true;
                    continue;
                }
                last_written = event.sequence;

                if let Err(source) = writer.sync_if_due() {
                    tracing::error!(
                        sequence = event.sequence,
                        error = %source,
                        "transaction log sync failed; no further events will be written"
                    );
                    shared.fail(KvError::LogSync {
                        sequence: last_written,
                        source,
                    });
                    failed = true;
                }
            }
            Message::Flush(ack) => {
                if !failed {
                    if let Err(source) = writer.sync() {
                        tracing::error!(error = %source, "transaction log sync failed");
                        shared.fail(KvError::LogSync {
                            sequence: last_written,
                            source,
                        });
                        failed = true;
                    }
                }
                // The flusher may have given up waiting
                let _ = ack.send(());
            }
        }
    }

    if !failed {
        if let Err(source) = writer.sync() {
            tracing::error!(error = %source, "final transaction log sync failed");
            shared.fail(KvError::LogSync {
                sequence: last_written,
                source,
            });
        }
    }
    if dropped > 0 {
        tracing::warn!(dropped, "events discarded after log write failure");
    }
    tracing::debug!(last_written, "log writer stopped");
}

// =============================================================================
// Replay iterator
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReplayState {
    Reading,
    Finished,
    Failed,
}

/// Lazy, ordered, finite stream of the events in the log.
///
/// Yields `Err` at most once and then ends. Not restartable.
pub struct Replay {
    reader: Option<LogReader>,
    shared: Arc<Shared>,
    stats: ReplayStats,
    state: ReplayState,
}

impl Replay {
    /// Statistics for the records delivered so far
    pub fn stats(&self) -> &ReplayStats {
        &self.stats
    }

    /// True once the whole log was read without error
    pub fn is_complete(&self) -> bool {
        self.state == ReplayState::Finished
    }

    /// Record the end of a clean pass. Only counts while the logger is
    /// still waiting for `start`; the counter never moves backwards.
    fn finish(&mut self) {
        self.state = ReplayState::Finished;
        {
            let mut intake = self.shared.intake.lock();
            if intake.phase == Phase::Replayed {
                intake.last_sequence = intake.last_sequence.max(self.stats.last_sequence);
                intake.primed = true;
            }
        }

        tracing::debug!(
            events = self.stats.events_read,
            last_sequence = self.stats.last_sequence,
            truncated_tail = self.stats.truncated_tail,
            "transaction log replay complete"
        );
    }

    fn superseded(&mut self) -> KvError {
        self.state = ReplayState::Failed;
        KvError::InvalidState("replay ended: logger already started or closed".into())
    }
}

impl Iterator for Replay {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state != ReplayState::Reading {
            return None;
        }
        if self.shared.intake.lock().phase != Phase::Replayed {
            return Some(Err(self.superseded()));
        }

        let Some(reader) = self.reader.as_mut() else {
            self.finish();
            return None;
        };

        match reader.next_event() {
            Ok(Some(event)) => {
                self.stats = reader.stats().clone();
                {
                    let mut intake = self.shared.intake.lock();
                    if intake.phase != Phase::Replayed {
                        drop(intake);
                        return Some(Err(self.superseded()));
                    }
                    intake.last_sequence = intake.last_sequence.max(event.sequence);
                }
                Some(Ok(event))
            }
            Ok(None) => {
                self.stats = reader.stats().clone();
                self.finish();
                None
            }
            Err(e) => {
                self.state = ReplayState::Failed;
                tracing::error!(error = %e, "transaction log replay failed");
                Some(Err(e))
            }
        }
    }
}

#[cfg(all(test, target_os = "linux"))]
impl TransactionLogger {
    /// A running logger whose every write fails with ENOSPC
    pub(crate) fn failing() -> TransactionLogger {
        let logger =
            TransactionLogger::open(Path::new("/dev/full"), WalSyncStrategy::EveryWrite).unwrap();
        // /dev/full reads as endless zeros; skip the priming scan
        logger.shared.intake.lock().primed = true;
        logger.start().unwrap();
        logger
    }
}
