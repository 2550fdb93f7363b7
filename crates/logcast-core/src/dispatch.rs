//! Per-sink delivery.
//!
//! Every active sink is driven by its own worker thread fed from a bounded
//! queue, so a sink that stalls only ever delays itself. Callers enqueue a
//! command on every worker first and only then wait (bounded) for them, so
//! sinks run in parallel while each still sees commands in enqueue order.
//!
//! ```text
//! Engine::dispatch ──try_send──▶ [ queue ] ──▶ worker ──▶ sink.write()
//!                  ──try_send──▶ [ queue ] ──▶ worker ──▶ sink.write()
//!        │
//!        └── wait_until(seq, deadline) per worker
//! ```
//!
//! Dispose travels through the same queue, so a sink is never written to
//! after its `dispose` has run.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::engine::{guarded, SinkFailure};
use crate::error::SinkError;
use crate::sink::{ConsoleSink, Sink};

/// Work executed against a sink on its worker thread.
pub(crate) type SinkCall = Box<dyn FnOnce(&dyn Sink) -> Result<(), SinkError> + Send>;

enum Command {
    Call { op: &'static str, call: SinkCall },
    Dispose,
}

/// Where isolated sink failures go: a shared counter, a `tracing` warning
/// and a console notice.
pub(crate) struct FailureChannel {
    count: Arc<AtomicU64>,
    console: Option<Arc<ConsoleSink>>,
}

impl FailureChannel {
    pub(crate) fn new(count: Arc<AtomicU64>, console: Option<Arc<ConsoleSink>>) -> Self {
        Self { count, console }
    }

    pub(crate) fn console(&self) -> Option<&ConsoleSink> {
        self.console.as_deref()
    }

    pub(crate) fn report(&self, sink: &str, op: &str, failure: &dyn fmt::Display) {
        self.count.fetch_add(1, Ordering::Relaxed);
        warn!(sink = %sink, op = %op, error = %failure, "Sink failure isolated");

        let notice = format!("sink '{}' failed on {}: {}", sink, op, failure);
        match &self.console {
            Some(console) => console.notice(&notice),
            None => eprintln!("[logcast] {}", notice),
        }
    }
}

/// Completed-command counter a caller can wait on.
#[derive(Default)]
struct Progress {
    /// Sequence number of the last enqueued command. Only advanced while
    /// holding `send_lock`, so sequence numbers match queue order.
    queued: AtomicU64,
    send_lock: Mutex<()>,
    processed: Mutex<u64>,
    advanced: Condvar,
    /// Set when a caller gave up waiting; cleared once the queue drains.
    lagging: AtomicBool,
}

impl Progress {
    fn advance(&self) {
        let mut processed = self.processed.lock();
        *processed += 1;
        if *processed >= self.queued.load(Ordering::Acquire) {
            self.lagging.store(false, Ordering::Relaxed);
        }
        self.advanced.notify_all();
    }
}

/// Handle to one sink's worker thread.
pub(crate) struct SinkWorker {
    name: String,
    durable: bool,
    tx: mpsc::Sender<Command>,
    progress: Arc<Progress>,
    failures: Arc<FailureChannel>,
}

impl SinkWorker {
    /// Start a worker thread that owns `sink` until it is disposed or the
    /// last handle is dropped.
    pub(crate) fn spawn(
        sink: Arc<dyn Sink>,
        capacity: usize,
        failures: Arc<FailureChannel>,
    ) -> std::io::Result<Self> {
        let name = sink.name().to_string();
        let durable = sink.supports_durable_flush();
        let (tx, mut rx) = mpsc::channel::<Command>(capacity.max(1));
        let progress = Arc::new(Progress::default());

        let worker_progress = progress.clone();
        let worker_failures = failures.clone();
        std::thread::Builder::new()
            .name(format!("logcast-{}", name))
            .spawn(move || {
                while let Some(command) = rx.blocking_recv() {
                    let (op, result, last) = match command {
                        Command::Call { op, call } => (op, guarded(|| call(sink.as_ref())), false),
                        Command::Dispose => ("dispose", guarded(|| sink.dispose()), true),
                    };
                    if let Err(failure) = result {
                        worker_failures.report(sink.name(), op, &failure);
                    }
                    worker_progress.advance();
                    if last {
                        break;
                    }
                }
                debug!(sink = %sink.name(), "Sink worker stopped");
            })?;

        Ok(Self {
            name,
            durable,
            tx,
            progress,
            failures,
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn supports_durable_flush(&self) -> bool {
        self.durable
    }

    /// Whether a caller recently timed out on this sink and it has not
    /// drained its queue since.
    pub(crate) fn is_lagging(&self) -> bool {
        self.progress.lagging.load(Ordering::Relaxed)
    }

    /// Queue `call`. Returns its sequence number, or `None` when the queue
    /// is full (reported as a failure) or the worker has stopped.
    pub(crate) fn submit(&self, op: &'static str, call: SinkCall) -> Option<u64> {
        self.enqueue(op, Command::Call { op, call })
    }

    /// Queue the final `dispose`; later submissions are discarded.
    pub(crate) fn submit_dispose(&self) -> Option<u64> {
        self.enqueue("dispose", Command::Dispose)
    }

    fn enqueue(&self, op: &'static str, command: Command) -> Option<u64> {
        let _send = self.progress.send_lock.lock();
        match self.tx.try_send(command) {
            Ok(()) => Some(self.progress.queued.fetch_add(1, Ordering::AcqRel) + 1),
            Err(TrySendError::Full(_)) => {
                self.failures.report(&self.name, op, &SinkFailure::QueueFull);
                None
            }
            Err(TrySendError::Closed(_)) => {
                debug!(sink = %self.name, op = %op, "Sink worker stopped, call discarded");
                None
            }
        }
    }

    /// Block until command `seq` has run or `deadline` passes. A miss marks
    /// the worker as lagging.
    pub(crate) fn wait_until(&self, seq: u64, deadline: Instant) -> bool {
        let mut processed = self.progress.processed.lock();
        while *processed < seq {
            if self.progress.advanced.wait_until(&mut processed, deadline).timed_out() {
                if *processed < seq {
                    self.progress.lagging.store(true, Ordering::Relaxed);
                    return false;
                }
                break;
            }
        }
        true
    }
}
