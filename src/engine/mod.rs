//! The opaque log engine boundary.
//!
//! The engine owns the physical record codec (binary framing, AES-128,
//! compression) and the persisted container. This crate only sequences
//! calls against it through the narrow contract below and translates its
//! status codes for a registered listener.
//!
//! # Module structure
//!
//! - `codes`: the engine's numeric status codes
//! - `adapter`: init state machine, status reporting and dedup

pub mod adapter;
pub mod codes;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

pub use adapter::EngineAdapter;

/// The five-operation contract an engine implementation must provide.
///
/// All operations return a status code from [`codes`]; `flush` and `debug`
/// report nothing. Implementations must be safe to call from the single
/// rotation worker; the crate never issues two calls concurrently.
pub trait LogEngine: Send + Sync {
    fn init(
        &self,
        cache_dir: &Path,
        log_dir: &Path,
        max_file_size: u64,
        key16: &[u8],
        iv16: &[u8],
    ) -> i32;

    /// Open (or create) the log file named by a day-boundary token.
    fn open(&self, file_token: &str) -> i32;

    fn write(
        &self,
        log_type: i32,
        content: &str,
        timestamp_ms: i64,
        thread_name: &str,
        thread_id: u64,
        is_main_thread: bool,
    ) -> i32;

    /// Force buffered records into the current file.
    fn flush(&self);

    /// Toggle the engine's own diagnostic output.
    fn debug(&self, enabled: bool);
}

/// Which engine call family a status code came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineCommand {
    Init,
    Open,
    Write,
    Flush,
}

impl fmt::Display for EngineCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineCommand::Init => "init",
            EngineCommand::Open => "open",
            EngineCommand::Write => "write",
            EngineCommand::Flush => "flush",
        };
        write!(f, "{}", name)
    }
}

/// Receives every non-success status code the adapter sees, subject to the
/// adapter's write-code dedup. At most one listener per adapter.
pub trait StatusListener: Send + Sync {
    fn on_status(&self, command: EngineCommand, code: i32);
}

impl<F: Fn(EngineCommand, i32) + Send + Sync> StatusListener for F {
    fn on_status(&self, command: EngineCommand, code: i32) {
        self(command, code)
    }
}

/// Shared slot holding the registered listener.
///
/// The pipeline facade writes it, the worker-owned adapter reads it, so it
/// can be (re)set at any time without touching the worker. The lock is
/// never held across the callback, so a listener may freely set or clear
/// the cell from inside `on_status`; a notification already in flight when
/// the cell is cleared still reaches the old listener.
#[derive(Clone, Default)]
pub struct StatusListenerCell {
    inner: Arc<Mutex<Option<Arc<dyn StatusListener>>>>,
}

impl StatusListenerCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, listener: Box<dyn StatusListener>) {
        *self.inner.lock() = Some(Arc::from(listener));
    }

    pub fn clear(&self) {
        *self.inner.lock() = None;
    }

    pub(crate) fn notify(&self, command: EngineCommand, code: i32) {
        let listener = self.inner.lock().clone();
        if let Some(listener) = listener {
            listener.on_status(command, code);
        }
    }
}
