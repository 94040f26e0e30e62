use serde::{Deserialize, Serialize};

/// One decoded log record, as it appears line-delimited inside a decoded
/// day file. Only constructed during export filtering.
///
/// The single-letter field names are the persisted wire shape; they stay
/// short to keep the re-serialized payload small.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Log content.
    #[serde(rename = "c")]
    pub content: String,
    /// Caller-defined type code.
    #[serde(rename = "f")]
    pub log_type: i32,
    /// Capture time, milliseconds since the Unix epoch.
    #[serde(rename = "l")]
    pub timestamp_ms: i64,
    /// Producer thread name.
    #[serde(rename = "n")]
    pub thread_name: String,
    /// Producer thread id.
    #[serde(rename = "i")]
    pub thread_id: u64,
    /// Whether the producer was the main thread.
    #[serde(rename = "m")]
    pub is_main_thread: bool,
}
