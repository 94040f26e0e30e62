//! In-process engine double for unit and integration tests.
//!
//! [`MockEngine`] records every call, returns scriptable status codes, and
//! can optionally persist writes as plaintext JSON lines into real day
//! files so export paths can be exercised end to end with [`PlainDecoder`].
//!
//! [`PlainDecoder`]: crate::export::PlainDecoder

use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::engine::LogEngine;
use crate::engine::codes;
use crate::error::ExportError;
use crate::export::{ExportPayload, ExportSink};
use crate::record::LogRecord;

/// One recorded engine invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Init,
    Open(String),
    Write {
        log_type: i32,
        content: String,
        timestamp_ms: i64,
    },
    Flush,
    Debug(bool),
}

#[derive(Default)]
struct MockState {
    calls: Vec<EngineCall>,
    init_code: Option<i32>,
    write_codes: VecDeque<i32>,
    log_dir: Option<PathBuf>,
    current_file: Option<PathBuf>,
}

/// Scriptable [`LogEngine`] that records its call sequence.
///
/// By default no status code is an error and nothing touches the
/// filesystem. [`MockEngine::persisting`] turns writes into JSON lines
/// appended to the opened day file under the `log_dir` it was initialized
/// with.
#[derive(Default)]
pub struct MockEngine {
    state: Mutex<MockState>,
    persist: bool,
    in_call: AtomicBool,
    overlapped: AtomicBool,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mock whose writes land as plaintext records in real day files.
    pub fn persisting() -> Self {
        Self {
            persist: true,
            ..Self::default()
        }
    }

    /// Snapshot of every call made so far, in order.
    pub fn calls(&self) -> Vec<EngineCall> {
        self.state.lock().calls.clone()
    }

    pub fn init_calls(&self) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| matches!(c, EngineCall::Init))
            .count()
    }

    pub fn write_count(&self) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| matches!(c, EngineCall::Write { .. }))
            .count()
    }

    /// Tokens passed to `open`, in call order.
    pub fn open_tokens(&self) -> Vec<String> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                EngineCall::Open(token) => Some(token.clone()),
                _ => None,
            })
            .collect()
    }

    /// Status code the next `init` returns.
    pub fn set_init_code(&self, code: i32) {
        self.state.lock().init_code = Some(code);
    }

    /// Status codes returned by successive writes; success once exhausted.
    pub fn script_write_codes(&self, script: impl IntoIterator<Item = i32>) {
        self.state.lock().write_codes.extend(script);
    }

    /// True if two engine calls ever overlapped in time.
    pub fn overlap_detected(&self) -> bool {
        self.overlapped.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        if self.in_call.swap(true, Ordering::SeqCst) {
            self.overlapped.store(true, Ordering::SeqCst);
        }
    }

    fn exit(&self) {
        self.in_call.store(false, Ordering::SeqCst);
    }
}

impl LogEngine for MockEngine {
    fn init(
        &self,
        _cache_dir: &Path,
        log_dir: &Path,
        _max_file_size: u64,
        _key16: &[u8],
        _iv16: &[u8],
    ) -> i32 {
        self.enter();
        let mut state = self.state.lock();
        state.calls.push(EngineCall::Init);
        state.log_dir = Some(log_dir.to_path_buf());
        let code = state.init_code.unwrap_or(codes::INIT_SUCCESS_MMAP);
        drop(state);
        self.exit();
        code
    }

    fn open(&self, file_token: &str) -> i32 {
        self.enter();
        let mut state = self.state.lock();
        state.calls.push(EngineCall::Open(file_token.to_string()));
        if self.persist {
            state.current_file = state.log_dir.as_ref().map(|dir| dir.join(file_token));
        }
        drop(state);
        self.exit();
        codes::OPEN_SUCCESS
    }

    fn write(
        &self,
        log_type: i32,
        content: &str,
        timestamp_ms: i64,
        thread_name: &str,
        thread_id: u64,
        is_main_thread: bool,
    ) -> i32 {
        self.enter();
        let mut state = self.state.lock();
        state.calls.push(EngineCall::Write {
            log_type,
            content: content.to_string(),
            timestamp_ms,
        });
        let code = state.write_codes.pop_front().unwrap_or(codes::WRITE_SUCCESS);
        if self.persist {
            if let Some(path) = state.current_file.clone() {
                let record = LogRecord {
                    content: content.to_string(),
                    log_type,
                    timestamp_ms,
                    thread_name: thread_name.to_string(),
                    thread_id,
                    is_main_thread,
                };
                append_record(&path, &record);
            }
        }
        drop(state);
        self.exit();
        code
    }

    fn flush(&self) {
        self.enter();
        self.state.lock().calls.push(EngineCall::Flush);
        self.exit();
    }

    fn debug(&self, enabled: bool) {
        self.enter();
        self.state.lock().calls.push(EngineCall::Debug(enabled));
        self.exit();
    }
}

/// [`ExportSink`] that collects delivered payloads in memory.
#[derive(Default)]
pub struct MemorySink {
    delivered: Mutex<Vec<(u64, ExportPayload)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivered(&self) -> Vec<(u64, ExportPayload)> {
        self.delivered.lock().clone()
    }
}

#[async_trait]
impl ExportSink for MemorySink {
    async fn deliver(&self, task_id: u64, payload: ExportPayload) -> Result<(), ExportError> {
        self.delivered.lock().push((task_id, payload));
        Ok(())
    }
}

fn append_record(path: &Path, record: &LogRecord) {
    let line = match serde_json::to_string(record) {
        Ok(line) => line,
        Err(_) => return,
    };
    let file = OpenOptions::new().create(true).append(true).open(path);
    if let Ok(mut file) = file {
        let _ = writeln!(file, "{}", line);
    }
}
