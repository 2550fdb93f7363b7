//! Remote telemetry sink.
//!
//! `write` only enqueues: entries go into a bounded channel drained by a
//! background Tokio task that batches them and hands each batch to a
//! host-supplied [`TelemetryTransport`]. A full queue drops the entry and
//! counts it, so network latency never reaches the caller.
//!
//! ```text
//! write() ──try_send──▶ [ bounded queue ] ──▶ worker task
//!                                               │ batch_size reached
//!                                               │ or flush_interval tick
//!                                               │ or Flush command
//!                                               ▼
//!                                       transport.send_batch()
//!                                       (retry with linear backoff)
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::RemoteSinkConfig;
use crate::entry::LogEntry;
use crate::error::{SinkError, TransportError};

use super::Sink;

/// Delivers serialized batches to an aggregation or analytics backend.
///
/// The transport is external to logcast: HTTP, gRPC, a vendor SDK. Batches
/// are arrays of canonical wire objects.
pub trait TelemetryTransport: Send + Sync {
    fn send_batch(&self, batch: Vec<Value>) -> BoxFuture<'static, Result<(), TransportError>>;
}

enum Command {
    Entry(Value),
    Flush(std::sync::mpsc::SyncSender<()>),
    Shutdown,
}

#[derive(Default)]
struct Counters {
    sent: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

struct Worker {
    tx: mpsc::Sender<Command>,
    handle: JoinHandle<()>,
}

/// Forwards entries at or above `config.min_level` to a transport.
pub struct RemoteSink {
    config: RemoteSinkConfig,
    transport: Arc<dyn TelemetryTransport>,
    worker: Mutex<Option<Worker>>,
    counters: Arc<Counters>,
    flush_timeout: Duration,
}

impl RemoteSink {
    pub fn new(config: RemoteSinkConfig, transport: Arc<dyn TelemetryTransport>) -> Self {
        Self {
            config,
            transport,
            worker: Mutex::new(None),
            counters: Arc::new(Counters::default()),
            flush_timeout: Duration::from_secs(2),
        }
    }

    /// How long `flush` waits for the worker to confirm delivery.
    pub fn with_flush_timeout(mut self, timeout: Duration) -> Self {
        self.flush_timeout = timeout;
        self
    }

    /// Entries delivered to the transport.
    pub fn sent(&self) -> u64 {
        self.counters.sent.load(Ordering::Relaxed)
    }

    /// Entries dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.counters.dropped.load(Ordering::Relaxed)
    }

    /// Entries lost after retries were exhausted.
    pub fn failed(&self) -> u64 {
        self.counters.failed.load(Ordering::Relaxed)
    }

    fn sender(&self) -> Result<mpsc::Sender<Command>, SinkError> {
        self.worker
            .lock()
            .as_ref()
            .map(|w| w.tx.clone())
            .ok_or(SinkError::Closed)
    }
}

impl Sink for RemoteSink {
    fn name(&self) -> &str {
        "remote"
    }

    fn initialize(&self) -> Result<(), SinkError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| SinkError::NoRuntime)?;

        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }

        let (tx, rx) = mpsc::channel(self.config.queue_capacity);
        let handle = runtime.spawn(run_worker(
            rx,
            self.transport.clone(),
            self.config.clone(),
            self.counters.clone(),
        ));
        *worker = Some(Worker { tx, handle });
        Ok(())
    }

    fn write(&self, entry: &LogEntry) -> Result<(), SinkError> {
        if entry.level < self.config.min_level {
            return Ok(());
        }
        let value = entry.to_json_value()?;

        match self.sender()?.try_send(Command::Entry(value)) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                let dropped = self.counters.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(dropped, "Remote queue full, entry dropped");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SinkError::Closed),
        }
    }

    /// Blocks until the worker has sent everything queued before this call,
    /// or `flush_timeout` elapses. Do not call from a single-threaded
    /// runtime's only worker thread.
    fn flush(&self) -> Result<(), SinkError> {
        let (ack_tx, ack_rx) = std::sync::mpsc::sync_channel(1);
        self.sender()?
            .try_send(Command::Flush(ack_tx))
            .map_err(|_| SinkError::Unavailable("remote queue full or closed".into()))?;

        ack_rx
            .recv_timeout(self.flush_timeout)
            .map_err(|_| SinkError::Unavailable("remote flush timed out".into()))
    }

    fn dispose(&self) -> Result<(), SinkError> {
        let Some(worker) = self.worker.lock().take() else {
            return Ok(());
        };
        if worker.tx.try_send(Command::Shutdown).is_err() {
            // Queue is full or the task is gone; nothing more can be delivered.
            worker.handle.abort();
        }
        Ok(())
    }
}

impl Drop for RemoteSink {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            worker.handle.abort();
        }
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<Command>,
    transport: Arc<dyn TelemetryTransport>,
    config: RemoteSinkConfig,
    counters: Arc<Counters>,
) {
    let mut batch: Vec<Value> = Vec::with_capacity(config.batch_size);
    let mut ticker = tokio::time::interval(Duration::from_millis(config.flush_interval_ms.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            cmd = rx.recv() => match cmd {
                Some(Command::Entry(value)) => {
                    batch.push(value);
                    if batch.len() >= config.batch_size {
                        deliver(&*transport, &mut batch, &config, &counters).await;
                    }
                }
                Some(Command::Flush(ack)) => {
                    deliver(&*transport, &mut batch, &config, &counters).await;
                    let _ = ack.try_send(());
                }
                Some(Command::Shutdown) | None => {
                    deliver(&*transport, &mut batch, &config, &counters).await;
                    break;
                }
            },
            _ = ticker.tick() => {
                deliver(&*transport, &mut batch, &config, &counters).await;
            }
        }
    }
    debug!("Remote sink worker stopped");
}

async fn deliver(
    transport: &dyn TelemetryTransport,
    batch: &mut Vec<Value>,
    config: &RemoteSinkConfig,
    counters: &Counters,
) {
    if batch.is_empty() {
        return;
    }
    let payload = std::mem::take(batch);
    let len = payload.len() as u64;
    let mut attempt: u32 = 0;

    loop {
        match transport.send_batch(payload.clone()).await {
            Ok(()) => {
                counters.sent.fetch_add(len, Ordering::Relaxed);
                return;
            }
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                attempt += 1;
                debug!(attempt, error = %e, "Retrying telemetry batch");
                let delay = config.retry_backoff_ms.saturating_mul(attempt as u64);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            Err(e) => {
                counters.failed.fetch_add(len, Ordering::Relaxed);
                warn!(entries = len, attempts = attempt + 1, error = %e, "Telemetry batch lost");
                return;
            }
        }
    }
}

/// Transport that keeps batches in memory.
///
/// Useful for hosts without a telemetry backend and in tests. Failures can be
/// injected with [`fail_next`](Self::fail_next).
#[derive(Default)]
pub struct InMemoryTransport {
    batches: Mutex<Vec<Vec<Value>>>,
    pending_failures: Mutex<Vec<TransportError>>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `send_batch` calls fail, in order.
    pub fn fail_next(&self, errors: impl IntoIterator<Item = TransportError>) {
        let mut pending = self.pending_failures.lock();
        pending.extend(errors);
    }

    pub fn batches(&self) -> Vec<Vec<Value>> {
        self.batches.lock().clone()
    }

    /// Every delivered entry, in delivery order.
    pub fn entries(&self) -> Vec<Value> {
        self.batches.lock().iter().flatten().cloned().collect()
    }
}

impl TelemetryTransport for InMemoryTransport {
    fn send_batch(&self, batch: Vec<Value>) -> BoxFuture<'static, Result<(), TransportError>> {
        let failure = {
            let mut pending = self.pending_failures.lock();
            if pending.is_empty() {
                None
            } else {
                Some(pending.remove(0))
            }
        };
        let result = match failure {
            Some(err) => Err(err),
            None => {
                self.batches.lock().push(batch);
                Ok(())
            }
        };
        futures::future::ready(result).boxed()
    }
}
