use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::LogConfig;

use super::codes;
use super::{EngineCommand, LogEngine, StatusListenerCell};

/// Owns the engine lifecycle on behalf of the rotation worker.
///
/// The adapter is a one-way state machine: it starts `Uninitialized` and
/// becomes `Initialized` only on a successful init call, never reverting.
/// Every operation except `init` is a no-op until then. Status codes are
/// forwarded to the registered listener, with write-failure codes reported
/// once per distinct code for the adapter's lifetime; the write link-failure
/// code is exempt because a missing entry point can recur meaningfully.
pub struct EngineAdapter {
    engine: Arc<dyn LogEngine>,
    listener: StatusListenerCell,
    initialized: bool,
    seen_write_codes: HashSet<i32>,
}

impl EngineAdapter {
    pub fn new(engine: Arc<dyn LogEngine>, listener: StatusListenerCell) -> Self {
        Self {
            engine,
            listener,
            initialized: false,
            seen_write_codes: HashSet::new(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Attempt engine init. Returns whether the adapter is initialized
    /// afterwards. Safe to retry; an already-initialized adapter returns
    /// immediately. An invalid config never initializes.
    pub fn init(&mut self, config: &LogConfig) -> bool {
        if self.initialized {
            return true;
        }
        if let Err(e) = config.validate() {
            debug!("engine init skipped, invalid config: {}", e);
            return false;
        }
        let code = self.engine.init(
            &config.cache_dir,
            &config.log_dir,
            config.max_file_size,
            &config.key,
            &config.iv,
        );
        self.report(EngineCommand::Init, code);
        self.initialized =
            code == codes::INIT_SUCCESS_MMAP || code == codes::INIT_SUCCESS_MEMORY;
        if self.initialized {
            debug!("log engine initialized (code {})", code);
        } else {
            warn!("log engine init failed (code {})", code);
        }
        self.initialized
    }

    pub fn open(&mut self, file_token: &str) {
        if !self.initialized {
            return;
        }
        debug!("opening log file {}", file_token);
        let code = self.engine.open(file_token);
        self.report(EngineCommand::Open, code);
    }

    #[allow(clippy::too_many_arguments)]
    pub fn write(
        &mut self,
        log_type: i32,
        content: &str,
        timestamp_ms: i64,
        thread_name: &str,
        thread_id: u64,
        is_main_thread: bool,
    ) {
        if !self.initialized {
            return;
        }
        let code = self.engine.write(
            log_type,
            content,
            timestamp_ms,
            thread_name,
            thread_id,
            is_main_thread,
        );
        self.report(EngineCommand::Write, code);
    }

    pub fn flush(&mut self) {
        if !self.initialized {
            return;
        }
        debug!("flushing log engine");
        self.engine.flush();
    }

    pub fn set_debug(&mut self, enabled: bool) {
        if !self.initialized {
            return;
        }
        self.engine.debug(enabled);
    }

    /// Forward a non-success status to the listener, deduplicating repeated
    /// write-failure codes.
    fn report(&mut self, command: EngineCommand, code: i32) {
        if codes::is_success(code) {
            return;
        }
        if command == EngineCommand::Write
            && code != codes::WRITE_FAIL_LINK
            && !self.seen_write_codes.insert(code)
        {
            return;
        }
        warn!("engine {} returned status {}", command, code);
        self.listener.notify(command, code);
    }
}
