//! `HistoryObserver` — a `TrackingObserver` that hands records to a
//! background writer thread.
//!
//! ```text
//! engine thread(s) ──Command──▶ sync_channel ──▶ tt-history worker ──▶ HistoryWriter
//!                   (queue_capacity)                   │
//!                                          batch_size / flush_interval
//!                                          retry with exponential backoff
//! ```
//!
//! Callbacks only build a row and `try_send` it, so a slow or failing store
//! never blocks ingestion.  A record that finds the queue full is dropped, as
//! is a batch that still fails after `max_retries`; both are counted in
//! [`HistoryStats`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use tt_core::TripId;
use tt_engine::TrackingObserver;
use tt_trip::{LocationSample, Rejection, StopEvent, Trip};

use crate::writer::HistoryWriter;
use crate::{HistoryConfig, HistoryError, HistoryResult, LocationRow, StopEventRow, TripRow};

// ── Channel protocol ──────────────────────────────────────────────────────────

enum Record {
    Sample(LocationRow),
    Event(StopEventRow),
    Trip(TripRow),
}

enum Command {
    Record(Record),
    /// Write everything buffered, then ack.
    Flush(Sender<()>),
    Shutdown,
}

// ── HistoryStats ──────────────────────────────────────────────────────────────

/// Counters shared between the observer and its worker.
#[derive(Debug, Default)]
pub struct HistoryStats {
    enqueued:         AtomicU64,
    written:          AtomicU64,
    failed_batches:   AtomicU64,
    dropped:          AtomicU64,
    rejected_samples: AtomicU64,
}

impl HistoryStats {
    /// Records handed to the worker.
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    /// Records the writer accepted.
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    /// Batches abandoned after exhausting their retries.
    pub fn failed_batches(&self) -> u64 {
        self.failed_batches.load(Ordering::Relaxed)
    }

    /// Records lost to failed batches, a full queue or a stopped worker.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Samples the engine rejected.  Not persisted.
    pub fn rejected_samples(&self) -> u64 {
        self.rejected_samples.load(Ordering::Relaxed)
    }
}

// ── Worker ────────────────────────────────────────────────────────────────────

struct Worker<W> {
    writer:  W,
    config:  HistoryConfig,
    stats:   Arc<HistoryStats>,
    samples: Vec<LocationRow>,
    events:  Vec<StopEventRow>,
    trips:   Vec<TripRow>,
}

impl<W: HistoryWriter> Worker<W> {
    fn pending(&self) -> usize {
        self.samples.len() + self.events.len() + self.trips.len()
    }

    fn push(&mut self, record: Record) {
        match record {
            Record::Sample(row) => self.samples.push(row),
            Record::Event(row) => self.events.push(row),
            Record::Trip(row) => self.trips.push(row),
        }
    }

    fn run(mut self, rx: Receiver<Command>) {
        let interval = Duration::from_millis(self.config.flush_interval_ms);
        let mut last_flush = Instant::now();

        loop {
            let timeout = interval.saturating_sub(last_flush.elapsed());
            match rx.recv_timeout(timeout) {
                Ok(Command::Record(record)) => {
                    self.push(record);
                    if self.pending() >= self.config.batch_size {
                        self.flush();
                        last_flush = Instant::now();
                    }
                }
                Ok(Command::Flush(ack)) => {
                    self.flush();
                    last_flush = Instant::now();
                    let _ = ack.send(());
                }
                Err(RecvTimeoutError::Timeout) => {
                    self.flush();
                    last_flush = Instant::now();
                }
                Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        self.flush();
        if let Err(e) = self.writer.finish() {
            error!(error = %e, "history writer failed to finish");
        }
    }

    /// Write the buffered records, retrying the unwritten remainder.
    fn flush(&mut self) {
        let pending = self.pending();
        if pending == 0 {
            return;
        }

        let mut attempt = 0;
        loop {
            match self.write_pending() {
                Ok(()) => {
                    debug!(records = pending, attempt, "history batch written");
                    return;
                }
                Err(e) if attempt < self.config.max_retries => {
                    attempt += 1;
                    let delay = self.config.backoff_ms(attempt);
                    warn!(error = %e, attempt, delay_ms = delay, "history write failed, retrying");
                    thread::sleep(Duration::from_millis(delay));
                }
                Err(e) => {
                    let lost = self.pending() as u64;
                    error!(error = %e, records = lost, "history batch dropped after retries");
                    self.stats.failed_batches.fetch_add(1, Ordering::Relaxed);
                    self.stats.dropped.fetch_add(lost, Ordering::Relaxed);
                    self.samples.clear();
                    self.events.clear();
                    self.trips.clear();
                    return;
                }
            }
        }
    }

    // Each part is cleared once written so a retry only replays what failed.
    fn write_pending(&mut self) -> HistoryResult<()> {
        if !self.samples.is_empty() {
            self.writer.write_samples(&self.samples)?;
            self.stats.written.fetch_add(self.samples.len() as u64, Ordering::Relaxed);
            self.samples.clear();
        }
        if !self.events.is_empty() {
            self.writer.write_stop_events(&self.events)?;
            self.stats.written.fetch_add(self.events.len() as u64, Ordering::Relaxed);
            self.events.clear();
        }
        if !self.trips.is_empty() {
            self.writer.write_trips(&self.trips)?;
            self.stats.written.fetch_add(self.trips.len() as u64, Ordering::Relaxed);
            self.trips.clear();
        }
        Ok(())
    }
}

// ── HistoryObserver ───────────────────────────────────────────────────────────

/// Persists engine activity through a [`HistoryWriter`] on a background
/// thread.
///
/// Share it with the engine as `Arc<HistoryObserver>` so the caller keeps a
/// handle for [`flush`](Self::flush), [`stats`](Self::stats) and
/// [`shutdown`](Self::shutdown).  Dropping the last handle shuts the worker
/// down and writes whatever is still buffered.
pub struct HistoryObserver {
    tx:     SyncSender<Command>,
    worker: Mutex<Option<JoinHandle<()>>>,
    stats:  Arc<HistoryStats>,
}

impl HistoryObserver {
    /// Start the worker thread that owns `writer`.
    pub fn spawn<W: HistoryWriter + 'static>(writer: W, config: HistoryConfig) -> HistoryResult<Self> {
        config.validate()?;
        let stats = Arc::new(HistoryStats::default());
        let (tx, rx) = mpsc::sync_channel(config.queue_capacity);

        let worker = Worker {
            writer,
            config: config.clone(),
            stats: Arc::clone(&stats),
            samples: Vec::with_capacity(config.batch_size),
            events: Vec::new(),
            trips: Vec::new(),
        };
        let handle = thread::Builder::new()
            .name("tt-history".into())
            .spawn(move || worker.run(rx))?;

        info!(
            batch_size = config.batch_size,
            flush_interval_ms = config.flush_interval_ms,
            queue_capacity = config.queue_capacity,
            "history worker started"
        );
        Ok(Self { tx, worker: Mutex::new(Some(handle)), stats })
    }

    pub fn stats(&self) -> &HistoryStats {
        &self.stats
    }

    /// Block until everything sent so far has been handed to the writer.
    pub fn flush(&self) -> HistoryResult<()> {
        let (ack_tx, ack_rx) = mpsc::channel();
        self.tx
            .send(Command::Flush(ack_tx))
            .map_err(|_| HistoryError::WorkerStopped)?;
        ack_rx.recv().map_err(|_| HistoryError::WorkerStopped)
    }

    /// Write the remaining buffer, finish the writer and join the worker.
    ///
    /// Later calls are no-ops; records sent afterwards count as dropped.
    pub fn shutdown(&self) -> HistoryResult<()> {
        let handle = self.worker.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(handle) = handle else {
            return Ok(());
        };
        let _ = self.tx.send(Command::Shutdown);
        handle.join().map_err(|_| HistoryError::WorkerPanicked)?;
        info!(
            written = self.stats.written(),
            dropped = self.stats.dropped(),
            failed_batches = self.stats.failed_batches(),
            "history worker stopped"
        );
        Ok(())
    }

    fn send(&self, record: Record) {
        match self.tx.try_send(Command::Record(record)) {
            Ok(()) => {
                self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(_)) => {
                let dropped = self.stats.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(dropped, "history queue full; record dropped");
            }
            Err(TrySendError::Disconnected(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("history worker stopped; record dropped");
            }
        }
    }
}

impl Drop for HistoryObserver {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!(error = %e, "history worker did not shut down cleanly");
        }
    }
}

impl TrackingObserver for HistoryObserver {
    fn on_trip_started(&self, trip: &Trip) {
        self.send(Record::Trip(TripRow::from(trip)));
    }

    fn on_sample_accepted(&self, sample: &LocationSample, late: bool) {
        self.send(Record::Sample(LocationRow::from_sample(sample, late)));
    }

    fn on_sample_rejected(&self, _trip_id: &TripId, _rejection: &Rejection) {
        self.stats.rejected_samples.fetch_add(1, Ordering::Relaxed);
    }

    fn on_stop_event(&self, event: &StopEvent) {
        self.send(Record::Event(StopEventRow::from(event)));
    }

    fn on_trip_closed(&self, trip: &Trip) {
        self.send(Record::Trip(TripRow::from(trip)));
    }
}
