//! Error types module
//!
//! Operation-level errors returned by the orchestrator. Per-item upload failures are
//! never reported here: they live on the item itself (`UploadItem::errors`) and reach
//! callers through the error lifecycle event.

use crate::models::{ItemId, ItemStatus};

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like misuse of a read-only queue
    Debug,
    /// Warning level - for recoverable issues
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata describing how an error should be presented and logged.
pub trait ErrorMetadata {
    /// Machine-readable error code (e.g., "READ_ONLY")
    fn error_code(&self) -> &'static str;

    /// Whether retrying the same call can succeed
    fn is_recoverable(&self) -> bool;

    /// Message suitable for showing to an end user
    fn client_message(&self) -> String;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Upload queue is read-only")]
    ReadOnly,

    #[error("Item not found: {0}")]
    NotFound(ItemId),

    #[error("Item {id} is {actual}, expected {expected}")]
    InvalidState {
        id: ItemId,
        expected: ItemStatus,
        actual: ItemStatus,
    },

    #[error("Transform stage failed: {0}")]
    Transform(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for orchestrator operations
pub type UploadResult<T> = Result<T, UploadError>;

/// Static metadata for each variant: (error_code, recoverable, log_level).
fn upload_error_static_metadata(err: &UploadError) -> (&'static str, bool, LogLevel) {
    match err {
        UploadError::ReadOnly => ("READ_ONLY", false, LogLevel::Debug),
        UploadError::NotFound(_) => ("NOT_FOUND", false, LogLevel::Debug),
        UploadError::InvalidState { .. } => ("INVALID_STATE", false, LogLevel::Debug),
        UploadError::Transform(_) => ("TRANSFORM_FAILED", true, LogLevel::Warn),
        UploadError::Config(_) => ("CONFIG_ERROR", false, LogLevel::Error),
        UploadError::Internal(_) => ("INTERNAL_ERROR", true, LogLevel::Error),
    }
}

impl ErrorMetadata for UploadError {
    fn error_code(&self) -> &'static str {
        upload_error_static_metadata(self).0
    }

    fn is_recoverable(&self) -> bool {
        upload_error_static_metadata(self).1
    }

    fn log_level(&self) -> LogLevel {
        upload_error_static_metadata(self).2
    }

    fn client_message(&self) -> String {
        match self {
            UploadError::ReadOnly => "Uploads are disabled for this list".to_string(),
            UploadError::NotFound(_) => "The file is no longer in the list".to_string(),
            UploadError::InvalidState { expected, .. } => {
                format!("Only {} files can be used for this action", expected)
            }
            UploadError::Transform(ref msg) => msg.clone(),
            UploadError::Config(_) | UploadError::Internal(_) => {
                "Internal error".to_string()
            }
        }
    }
}
