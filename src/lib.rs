//! Local, crash-safe log ingestion pipeline.
//!
//! Producers on any thread enqueue records through a [`LogPipeline`]; a
//! single rotation worker drains the queue in FIFO order and drives an
//! opaque [`engine::LogEngine`] that owns the encrypted on-disk format.
//! The worker rotates files on calendar-day boundaries and on size,
//! sweeps files past the retention window, and drops writes while free
//! storage stays under a threshold. Time-windowed exports run as
//! independent cancellable tasks over the persisted day files.
//!
//! # Module structure
//!
//! - `config`: pipeline configuration and validation
//! - `record`: the decoded record shape
//! - `engine`: the opaque engine contract, status codes and adapter
//! - `worker`: ingestion queue and the rotation worker
//! - `capacity`: free-storage probing
//! - `retention`: day-token parsing and the expiry sweep
//! - `export`: cancellable time-windowed export tasks
//! - `pipeline`: the public facade
//! - `mock`: scriptable engine double and in-memory sink for tests

pub mod capacity;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod mock;
pub mod pipeline;
pub mod record;
pub mod retention;
pub mod worker;

pub use capacity::{CapacityProbe, FsCapacityProbe};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::LogConfig;
pub use engine::{EngineCommand, LogEngine, StatusListener};
pub use error::{ConfigError, ExportError};
pub use export::{ExportPayload, ExportSink, LogDecoder, PlainDecoder};
pub use pipeline::{LogPipeline, PipelineOptions};
pub use record::LogRecord;
