//! Ingestion queue and the single rotation worker.
//!
//! Producers on any thread enqueue actions through a cloneable
//! [`IngestHandle`]; exactly one spawned worker task drains the queue and
//! applies actions against the engine adapter in FIFO order. Because the
//! adapter lives inside that task, at most one engine call is ever in
//! flight, which is the delivery guarantee offered to callers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::capacity::{CapacityProbe, has_capacity};
use crate::clock::{Clock, local_day_start_ms};
use crate::config::LogConfig;
use crate::engine::{EngineAdapter, LogEngine, StatusListenerCell};
use crate::retention::sweep_expired;

/// How long a capacity verdict is cached before re-probing the filesystem.
const CAPACITY_COOLDOWN_MS: i64 = 60 * 1000;

/// One queued unit of work, consumed exactly once by the worker.
#[derive(Debug)]
pub enum Action {
    Write(WriteRequest),
    Flush,
    /// Reserved; currently a no-op.
    Send,
}

/// Payload of a write action, captured on the producer thread at enqueue.
#[derive(Debug)]
pub struct WriteRequest {
    pub content: String,
    pub log_type: i32,
    pub timestamp_ms: i64,
    pub thread_name: String,
    pub thread_id: u64,
    pub is_main_thread: bool,
}

/// Process-local numeric thread id, since std thread ids have no stable
/// integer representation.
fn current_thread_id() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    thread_local! {
        static ID: u64 = NEXT.fetch_add(1, Ordering::Relaxed);
    }
    ID.with(|id| *id)
}

/// Cloneable producer-facing handle over the ingestion queue.
#[derive(Clone)]
pub struct IngestHandle {
    tx: mpsc::UnboundedSender<Action>,
    stop: CancellationToken,
    flush_on_quit: Arc<AtomicBool>,
    quit_called: Arc<AtomicBool>,
    clock: Arc<dyn Clock>,
}

impl IngestHandle {
    /// Queue a write. Non-blocking; returns immediately. Blank content is
    /// silently dropped. Calls after `quit` are lost by design.
    pub fn enqueue_write(&self, content: impl Into<String>, log_type: i32) {
        let content = content.into();
        if content.trim().is_empty() {
            return;
        }
        let thread = std::thread::current();
        let request = WriteRequest {
            content,
            log_type,
            timestamp_ms: self.clock.now_ms(),
            thread_name: thread.name().unwrap_or("unnamed").to_string(),
            thread_id: current_thread_id(),
            is_main_thread: thread.name() == Some("main"),
        };
        let _ = self.tx.send(Action::Write(request));
    }

    /// Queue a forced flush. Non-blocking.
    pub fn enqueue_flush(&self) {
        let _ = self.tx.send(Action::Flush);
    }

    /// Stop the worker. With `flush`, one final engine flush runs before
    /// the loop exits. Actions still queued are not drained; that is the
    /// fast-shutdown trade-off. Idempotent: later calls do nothing.
    pub fn quit(&self, flush: bool) {
        if self.quit_called.swap(true, Ordering::SeqCst) {
            return;
        }
        self.flush_on_quit.store(flush, Ordering::SeqCst);
        self.stop.cancel();
        info!("log ingestion shutting down (flush: {})", flush);
    }
}

/// Rotation bookkeeping. Mutated only by the worker task.
#[derive(Debug, Default)]
struct RotationState {
    /// Day-boundary timestamp of the last `open`, 0 before the first.
    last_open_day: i64,
    /// When capacity was last probed.
    last_capacity_check: Option<i64>,
    /// Cached capacity verdict for the current cooldown window.
    capacity_ok: bool,
}

/// The single consumer of the ingestion queue.
pub struct RotationWorker {
    config: Arc<LogConfig>,
    adapter: EngineAdapter,
    clock: Arc<dyn Clock>,
    probe: Arc<dyn CapacityProbe>,
    stop: CancellationToken,
    flush_on_quit: Arc<AtomicBool>,
    state: RotationState,
}

impl RotationWorker {
    /// Build the queue, its producer handle and the worker. The receiver is
    /// handed back so the caller decides where the loop runs; pass it to
    /// [`RotationWorker::start`].
    pub fn new(
        config: Arc<LogConfig>,
        engine: Arc<dyn LogEngine>,
        listener: StatusListenerCell,
        clock: Arc<dyn Clock>,
        probe: Arc<dyn CapacityProbe>,
    ) -> (Self, IngestHandle, mpsc::UnboundedReceiver<Action>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let stop = CancellationToken::new();
        let flush_on_quit = Arc::new(AtomicBool::new(false));
        let handle = IngestHandle {
            tx,
            stop: stop.clone(),
            flush_on_quit: flush_on_quit.clone(),
            quit_called: Arc::new(AtomicBool::new(false)),
            clock: clock.clone(),
        };
        let worker = Self {
            config,
            adapter: EngineAdapter::new(engine, listener),
            clock,
            probe,
            stop,
            flush_on_quit,
            state: RotationState::default(),
        };
        (worker, handle, rx)
    }

    /// Spawn the worker loop onto the current runtime.
    pub fn start(mut self, mut rx: mpsc::UnboundedReceiver<Action>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = self.stop.cancelled() => {
                        if self.flush_on_quit.load(Ordering::SeqCst) {
                            self.ensure_initialized();
                            self.adapter.flush();
                        }
                        debug!("rotation worker stopped");
                        break;
                    }
                    action = rx.recv() => {
                        match action {
                            Some(action) => self.dispatch(action),
                            None => {
                                debug!("ingestion queue closed, rotation worker exiting");
                                break;
                            }
                        }
                    }
                }
            }
        })
    }

    fn dispatch(&mut self, action: Action) {
        self.ensure_initialized();
        if !self.adapter.is_initialized() {
            // Disabled (invalid config) or the engine keeps failing init;
            // the action is consumed and dropped.
            return;
        }
        match action {
            Action::Write(request) => self.apply_write(request),
            Action::Flush => self.adapter.flush(),
            Action::Send => {}
        }
    }

    fn ensure_initialized(&mut self) {
        if self.adapter.is_initialized() {
            return;
        }
        if self.adapter.init(&self.config) {
            self.adapter.set_debug(self.config.debug);
        }
    }

    fn apply_write(&mut self, request: WriteRequest) {
        let now = self.clock.now_ms();

        // Calendar-day rollover: sweep expired files, then open the new
        // day's file, before the write that crossed the boundary.
        let today = local_day_start_ms(now);
        if today != self.state.last_open_day {
            let cutoff = today - self.config.retention_ms();
            let removed = sweep_expired(&self.config.log_dir, cutoff);
            if removed > 0 {
                info!("retention sweep removed {} file(s)", removed);
            }
            self.adapter.open(&today.to_string());
            self.state.last_open_day = today;
        }

        // Capacity verdict is cached for the cooldown window.
        let due = match self.state.last_capacity_check {
            None => true,
            Some(last) => now - last > CAPACITY_COOLDOWN_MS,
        };
        if due {
            self.state.capacity_ok = has_capacity(
                self.probe.as_ref(),
                &self.config.log_dir,
                self.config.min_free_bytes,
            );
            self.state.last_capacity_check = Some(now);
            if !self.state.capacity_ok {
                error!(
                    "free storage under {:?} at or below {} bytes, dropping writes",
                    self.config.log_dir, self.config.min_free_bytes
                );
            }
        }
        if !self.state.capacity_ok {
            // Lossy degradation under storage pressure, not an error.
            debug!("write dropped, insufficient storage capacity");
            return;
        }

        self.adapter.write(
            request.log_type,
            &request.content,
            request.timestamp_ms,
            &request.thread_name,
            request.thread_id,
            request.is_main_thread,
        );
    }
}
