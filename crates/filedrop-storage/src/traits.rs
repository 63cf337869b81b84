//! Upload transport abstraction
//!
//! This module defines the UploadTransport trait that all backends must implement,
//! along with the payload, progress and error types that cross it.

use async_trait::async_trait;
use filedrop_core::{LocalFile, RemoteDescriptor, StorageBackend};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Message used when a failure carries no usable text.
pub const UNKNOWN_ERROR_MESSAGE: &str = "Unknown error";

/// Transport operation errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// The store refused the file. `file` holds messages about this particular file
    /// (size, content), `file_type` holds messages about its type.
    #[error("Validation failed: {}", format_validation(.file, .file_type))]
    Validation {
        file: Vec<String>,
        file_type: Vec<String>,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Upload aborted")]
    Aborted,

    #[error("{}", UNKNOWN_ERROR_MESSAGE)]
    Unknown,
}

fn format_validation(file: &[String], file_type: &[String]) -> String {
    file.iter()
        .chain(file_type.iter())
        .cloned()
        .collect::<Vec<_>>()
        .join("; ")
}

impl TransportError {
    /// Messages stored on the errored item.
    ///
    /// File-specific validation messages win over type-specific ones, which win over
    /// the generic message. Falls back to a single "Unknown error".
    pub fn messages(&self) -> Vec<String> {
        let messages = match self {
            TransportError::Validation { file, file_type } => {
                if !file.is_empty() {
                    file.clone()
                } else {
                    file_type.clone()
                }
            }
            TransportError::Transport(msg) => vec![msg.clone()],
            TransportError::Io(e) => vec![e.to_string()],
            TransportError::Aborted => vec!["Upload aborted".to_string()],
            TransportError::Unknown => Vec::new(),
        };

        let messages: Vec<String> = messages
            .into_iter()
            .filter(|m| !m.trim().is_empty())
            .collect();

        if messages.is_empty() {
            vec![UNKNOWN_ERROR_MESSAGE.to_string()]
        } else {
            messages
        }
    }
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// What gets uploaded for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPayload {
    pub file: LocalFile,
    /// Alternate file used only to build a preview.
    pub preview: Option<LocalFile>,
}

impl UploadPayload {
    pub fn new(file: LocalFile) -> Self {
        Self {
            file,
            preview: None,
        }
    }

    pub fn with_preview(mut self, preview: Option<LocalFile>) -> Self {
        self.preview = preview;
        self
    }
}

/// Receives upload progress as a percentage.
#[derive(Clone)]
pub struct ProgressSink {
    inner: Arc<dyn Fn(u8) + Send + Sync>,
}

impl ProgressSink {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(u8) + Send + Sync + 'static,
    {
        Self { inner: Arc::new(f) }
    }

    /// A sink that discards every report.
    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    /// Report a percentage, clamped to 100.
    pub fn report(&self, percent: u8) {
        (self.inner)(percent.min(100))
    }

    /// Report progress as bytes done out of `total`.
    pub fn report_bytes(&self, done: u64, total: u64) {
        let percent = if total == 0 {
            100
        } else {
            (done.saturating_mul(100) / total).min(100) as u8
        };
        self.report(percent)
    }
}

impl fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressSink").finish_non_exhaustive()
    }
}

/// Upload transport trait
///
/// Implementations send one payload to the remote store and report progress while
/// doing so. Aborting is done by dropping the returned future, so implementations must
/// leave nothing behind when dropped mid-upload.
#[async_trait]
pub trait UploadTransport: Send + Sync {
    /// Upload the payload and describe the persisted file.
    async fn upload(
        &self,
        payload: UploadPayload,
        progress: ProgressSink,
    ) -> TransportResult<RemoteDescriptor>;

    /// Get the storage backend type, if this is one of the built-in backends
    fn backend_type(&self) -> Option<StorageBackend> {
        None
    }
}
