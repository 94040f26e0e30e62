use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Milliseconds in one calendar day.
pub const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Bytes in one mebibyte.
pub const MIB: u64 = 1024 * 1024;

/// Default maximum size of a single log file (10 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * MIB;

/// Default retention window for persisted log files (7 days).
pub const DEFAULT_RETENTION: Duration = Duration::from_millis(7 * DAY_MS as u64);

/// Default minimum free storage below which writes are dropped (50 MiB).
pub const DEFAULT_MIN_FREE_BYTES: u64 = 50 * MIB;

/// Immutable pipeline configuration, validated once at adapter init.
///
/// Constructed with [`LogConfig::new`] and tuned with the chained setters.
/// An invalid config (blank path, empty key/iv) does not error at
/// construction; it leaves the engine adapter permanently uninitialized, so
/// every ingestion action degrades to a no-op.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Directory for the engine's private cache (mmap backing file).
    pub cache_dir: PathBuf,
    /// Directory holding the day-named persisted log files.
    pub log_dir: PathBuf,
    /// 16-byte AES key handed to the engine.
    pub key: Vec<u8>,
    /// 16-byte AES IV handed to the engine.
    pub iv: Vec<u8>,
    /// Maximum size of a single log file in bytes.
    pub max_file_size: u64,
    /// How long persisted log files are kept before the sweeper deletes them.
    pub retention: Duration,
    /// Writes are dropped while available storage is at or below this.
    pub min_free_bytes: u64,
    /// Forwarded to the engine's debug toggle at init.
    pub debug: bool,
}

impl LogConfig {
    pub fn new(
        cache_dir: impl Into<PathBuf>,
        log_dir: impl Into<PathBuf>,
        key: impl Into<Vec<u8>>,
        iv: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            log_dir: log_dir.into(),
            key: key.into(),
            iv: iv.into(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            retention: DEFAULT_RETENTION,
            min_free_bytes: DEFAULT_MIN_FREE_BYTES,
            debug: false,
        }
    }

    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    pub fn retention(mut self, window: Duration) -> Self {
        self.retention = window;
        self
    }

    pub fn min_free_bytes(mut self, bytes: u64) -> Self {
        self.min_free_bytes = bytes;
        self
    }

    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    /// Check the parameters the engine cannot work without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_dir.as_os_str().to_string_lossy().trim().is_empty() {
            return Err(ConfigError::BlankCachePath);
        }
        if self.log_dir.as_os_str().to_string_lossy().trim().is_empty() {
            return Err(ConfigError::BlankLogDir);
        }
        if self.key.is_empty() {
            return Err(ConfigError::EmptyKey);
        }
        if self.iv.is_empty() {
            return Err(ConfigError::EmptyIv);
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Retention window in milliseconds, for cutoff arithmetic.
    pub fn retention_ms(&self) -> i64 {
        self.retention.as_millis() as i64
    }
}
