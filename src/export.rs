//! Time-windowed export tasks over the persisted day files.
//!
//! Each export runs as its own cancellable task: it selects the day files
//! overlapping the requested window, and either decodes and filters them
//! down to a text payload (windows under one day) or hands the raw files to
//! the sink (larger windows). Tasks never touch the ingestion worker; the
//! day files are append-only from its side, so concurrent reads observe a
//! valid prefix.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::local_day_start_ms;
use crate::config::DAY_MS;
use crate::error::ExportError;
use crate::record::LogRecord;
use crate::retention::parse_day_token;

/// What an export task hands to the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportPayload {
    /// Decoded, time-and-type filtered records, one JSON line each.
    Text(String),
    /// Paths of the raw day files overlapping the window.
    Files(Vec<PathBuf>),
}

/// Turns one persisted day file back into line-delimited record text.
///
/// The production decoder reverses the engine's container format; tests use
/// [`PlainDecoder`] against plaintext files.
pub trait LogDecoder: Send + Sync {
    fn decode(&self, path: &Path) -> anyhow::Result<String>;
}

/// Decoder for files that are already line-delimited JSON text.
pub struct PlainDecoder;

impl LogDecoder for PlainDecoder {
    fn decode(&self, path: &Path) -> anyhow::Result<String> {
        Ok(std::fs::read_to_string(path)?)
    }
}

/// Receives finished export payloads. Delivery races the task's cancel
/// token, so a slow sink cannot pin a cancelled task.
#[async_trait]
pub trait ExportSink: Send + Sync {
    async fn deliver(&self, task_id: u64, payload: ExportPayload) -> Result<(), ExportError>;
}

struct ExportTask {
    cancel: CancellationToken,
    handle: tokio::task::JoinHandle<()>,
}

/// Spawns and tracks export tasks.
///
/// Task ids are process-unique and never reused. The task table is swept
/// lazily on each submit; finished entries linger until then, which is
/// harmless because cancelling a finished task is a no-op.
pub struct ExportManager {
    log_dir: PathBuf,
    decoder: Arc<dyn LogDecoder>,
    sink: Arc<dyn ExportSink>,
    next_id: AtomicU64,
    tasks: Mutex<HashMap<u64, ExportTask>>,
}

impl ExportManager {
    pub fn new(log_dir: PathBuf, decoder: Arc<dyn LogDecoder>, sink: Arc<dyn ExportSink>) -> Self {
        Self {
            log_dir,
            decoder,
            sink,
            next_id: AtomicU64::new(1000),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Start an export of records in `[begin_ms, end_ms]`, keeping only the
    /// given type codes (an empty set keeps everything). Returns the task id
    /// immediately; the work runs in the background.
    pub fn submit(&self, types: HashSet<i32>, begin_ms: i64, end_ms: i64) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let cancel = CancellationToken::new();
        let job = ExportJob {
            id,
            types,
            begin_ms,
            end_ms,
            log_dir: self.log_dir.clone(),
            decoder: self.decoder.clone(),
            sink: self.sink.clone(),
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(job.run());

        let mut tasks = self.tasks.lock();
        tasks.retain(|_, task| !task.handle.is_finished() && !task.cancel.is_cancelled());
        tasks.insert(id, ExportTask { cancel, handle });
        id
    }

    /// Cancel a running export. Unknown or finished ids are ignored.
    pub fn cancel(&self, id: u64) {
        if let Some(task) = self.tasks.lock().remove(&id) {
            task.cancel.cancel();
            info!("export task {} cancelled", id);
        }
    }

    /// Cancel every tracked export.
    pub fn cancel_all(&self) {
        let mut tasks = self.tasks.lock();
        for (id, task) in tasks.drain() {
            task.cancel.cancel();
            debug!("export task {} cancelled", id);
        }
    }

    /// Whether a task id is still tracked. Lazy sweeping means a finished
    /// task can still count as active until the next submit.
    pub fn is_tracked(&self, id: u64) -> bool {
        self.tasks.lock().contains_key(&id)
    }
}

struct ExportJob {
    id: u64,
    types: HashSet<i32>,
    begin_ms: i64,
    end_ms: i64,
    log_dir: PathBuf,
    decoder: Arc<dyn LogDecoder>,
    sink: Arc<dyn ExportSink>,
    cancel: CancellationToken,
}

impl ExportJob {
    async fn run(self) {
        if self.end_ms < self.begin_ms {
            warn!("export task {} has an inverted window, nothing to do", self.id);
            return;
        }
        let files = overlapping_day_files(&self.log_dir, self.begin_ms, self.end_ms);
        if files.is_empty() {
            debug!("export task {} matched no day files", self.id);
            return;
        }

        let payload = if self.end_ms - self.begin_ms < DAY_MS {
            let decoder = self.decoder.clone();
            let types = self.types.clone();
            let (begin, end) = (self.begin_ms, self.end_ms);
            let cancel = self.cancel.clone();
            let text = tokio::task::spawn_blocking(move || {
                assemble_text(&files, &types, begin, end, decoder.as_ref(), &cancel)
            })
            .await
            .unwrap_or_default();
            match text {
                Some(text) if !text.is_empty() => ExportPayload::Text(text),
                _ => {
                    debug!("export task {} produced no records", self.id);
                    return;
                }
            }
        } else {
            ExportPayload::Files(files)
        };

        if self.cancel.is_cancelled() {
            return;
        }
        tokio::select! {
            _ = self.cancel.cancelled() => {
                debug!("export task {} cancelled during delivery", self.id);
            }
            result = self.sink.deliver(self.id, payload) => {
                match result {
                    Ok(()) => info!("export task {} delivered", self.id),
                    Err(err) => warn!("export task {} delivery failed: {}", self.id, err),
                }
            }
        }
    }
}

/// Day files in `dir` whose day token falls inside the window, ascending.
fn overlapping_day_files(dir: &Path, begin_ms: i64, end_ms: i64) -> Vec<PathBuf> {
    let first = local_day_start_ms(begin_ms);
    let last = local_day_start_ms(end_ms);
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!("cannot list log directory {:?}: {}", dir, err);
            return Vec::new();
        }
    };
    let mut files: Vec<(i64, PathBuf)> = entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name();
            let token = parse_day_token(name.to_str()?)?;
            (first..=last).contains(&token).then(|| (token, entry.path()))
        })
        .collect();
    files.sort_by_key(|(token, _)| *token);
    files.into_iter().map(|(_, path)| path).collect()
}

/// Decode, filter and re-join records. Returns `None` when cancelled.
/// Any decode or parse failure empties the payload so the sink never sees
/// a partially corrupt export.
fn assemble_text(
    files: &[PathBuf],
    types: &HashSet<i32>,
    begin_ms: i64,
    end_ms: i64,
    decoder: &dyn LogDecoder,
    cancel: &CancellationToken,
) -> Option<String> {
    let mut out = String::new();
    for path in files {
        let text = match decoder.decode(path) {
            Ok(text) => text,
            Err(err) => {
                warn!("decode of {:?} failed, dropping export payload: {}", path, err);
                return Some(String::new());
            }
        };
        for line in text.lines() {
            if cancel.is_cancelled() {
                return None;
            }
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let record: LogRecord = match serde_json::from_str(line) {
                Ok(record) => record,
                Err(err) => {
                    warn!("corrupt record in {:?}, dropping export payload: {}", path, err);
                    return Some(String::new());
                }
            };
            let in_window = record.timestamp_ms >= begin_ms && record.timestamp_ms <= end_ms;
            let wanted = types.is_empty() || types.contains(&record.log_type);
            if in_window && wanted {
                out.push_str(line);
                out.push('\n');
            }
        }
    }
    Some(out)
}
