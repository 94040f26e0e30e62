//! The public facade tying ingestion, rotation and export together.
//!
//! [`LogPipeline::start`] wires one rotation worker over one engine and
//! returns a cheap-to-clone front. Writes from any thread funnel through
//! the ingestion queue; exports run as independent cancellable tasks over
//! the persisted day files.

use std::collections::HashSet;
use std::error::Error;
use std::fmt::Write as _;
use std::sync::Arc;

use crate::capacity::{CapacityProbe, FsCapacityProbe};
use crate::clock::{Clock, SystemClock};
use crate::config::{DAY_MS, LogConfig};
use crate::engine::{LogEngine, StatusListener, StatusListenerCell};
use crate::export::{ExportManager, ExportSink, LogDecoder, PlainDecoder};
use crate::worker::{IngestHandle, RotationWorker};

/// Everything a pipeline needs before it starts.
///
/// Config, engine and sink are always caller-provided; decoder, clock and
/// capacity probe default to the production implementations and are
/// swappable for tests.
pub struct PipelineOptions {
    pub config: LogConfig,
    pub engine: Arc<dyn LogEngine>,
    pub sink: Arc<dyn ExportSink>,
    pub decoder: Arc<dyn LogDecoder>,
    pub clock: Arc<dyn Clock>,
    pub probe: Arc<dyn CapacityProbe>,
}

impl PipelineOptions {
    pub fn new(config: LogConfig, engine: Arc<dyn LogEngine>, sink: Arc<dyn ExportSink>) -> Self {
        Self {
            config,
            engine,
            sink,
            decoder: Arc::new(PlainDecoder),
            clock: Arc::new(SystemClock),
            probe: Arc::new(FsCapacityProbe),
        }
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn LogDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn CapacityProbe>) -> Self {
        self.probe = probe;
        self
    }
}

/// Handle over a running pipeline.
pub struct LogPipeline {
    ingest: IngestHandle,
    exports: ExportManager,
    listener: StatusListenerCell,
    clock: Arc<dyn Clock>,
    worker: tokio::task::JoinHandle<()>,
}

impl LogPipeline {
    /// Spawn the rotation worker and return the facade. Must run inside a
    /// tokio runtime.
    pub fn start(options: PipelineOptions) -> Self {
        let config = Arc::new(options.config);
        let listener = StatusListenerCell::new();
        let (worker, ingest, rx) = RotationWorker::new(
            config.clone(),
            options.engine,
            listener.clone(),
            options.clock.clone(),
            options.probe,
        );
        let join = worker.start(rx);
        let exports = ExportManager::new(config.log_dir.clone(), options.decoder, options.sink);
        Self {
            ingest,
            exports,
            listener,
            clock: options.clock,
            worker: join,
        }
    }

    /// Queue one record. Returns immediately; blank content is dropped.
    pub fn write(&self, content: impl Into<String>, log_type: i32) {
        self.ingest.enqueue_write(content, log_type);
    }

    /// Queue one record carrying an error and its source chain.
    pub fn write_error(&self, context: &str, log_type: i32, error: &dyn Error) {
        let mut content = format!("{}: {}", context, error);
        let mut source = error.source();
        while let Some(cause) = source {
            let _ = write!(content, ": {}", cause);
            source = cause.source();
        }
        self.ingest.enqueue_write(content, log_type);
    }

    /// Queue a forced flush of the engine's write buffer.
    pub fn flush(&self) {
        self.ingest.enqueue_flush();
    }

    /// Stop ingestion and let the worker exit. With `flush`, the engine
    /// flushes once before stopping. Idempotent. Running exports are not
    /// affected; cancel them explicitly with
    /// [`LogPipeline::cancel_all_exports`].
    pub fn quit(&self, flush: bool) {
        self.ingest.quit(flush);
    }

    /// Like [`LogPipeline::quit`], then wait for the worker to finish.
    pub async fn shutdown(self, flush: bool) {
        self.quit(flush);
        let _ = self.worker.await;
    }

    /// Start an export over `[begin_ms, end_ms]` keeping the given type
    /// codes (empty set keeps everything). Returns the task id.
    pub fn submit_export(&self, types: HashSet<i32>, begin_ms: i64, end_ms: i64) -> u64 {
        self.exports.submit(types, begin_ms, end_ms)
    }

    /// Export everything from the last `days` days, all types.
    pub fn export_recent(&self, days: u32) -> u64 {
        let now = self.clock.now_ms();
        self.exports
            .submit(HashSet::new(), now - i64::from(days) * DAY_MS, now)
    }

    /// Cancel a running export. Unknown ids are ignored.
    pub fn cancel_export(&self, id: u64) {
        self.exports.cancel(id);
    }

    pub fn cancel_all_exports(&self) {
        self.exports.cancel_all();
    }

    /// Register the status listener, replacing any previous one.
    pub fn set_status_listener(&self, listener: Box<dyn StatusListener>) {
        self.listener.set(listener);
    }

    pub fn clear_status_listener(&self) {
        self.listener.clear();
    }
}
