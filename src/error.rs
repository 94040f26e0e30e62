use thiserror::Error;

/// Validation errors for [`crate::LogConfig`].
///
/// An invalid config never aborts the pipeline; it permanently disables the
/// engine adapter for that instance. The error type exists so callers can
/// check validity up front if they want to.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("cache directory path is blank")]
    BlankCachePath,

    #[error("log directory path is blank")]
    BlankLogDir,

    #[error("encryption key is empty")]
    EmptyKey,

    #[error("encryption iv is empty")]
    EmptyIv,
}

/// Errors raised on the export path.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("record parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("payload delivery failed: {0}")]
    Delivery(String),
}
