use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Normalize an extension for comparison: trimmed, without a leading dot, lowercase.
///
/// `".PNG"`, `"png"` and `" .png "` all normalize to `"png"`.
pub fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}

/// A file on the local filesystem selected for upload (or used as a preview).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalFile {
    pub path: PathBuf,
    /// Display name, defaults to the final path component.
    pub name: String,
    /// Size in bytes when known up front.
    pub size: Option<u64>,
}

impl LocalFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Self {
            path,
            name,
            size: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Normalized extension of the display name, if it has one.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.name)
            .extension()
            .and_then(|e| e.to_str())
            .map(normalize_extension)
            .filter(|e| !e.is_empty())
    }
}

/// Describes a file persisted by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDescriptor {
    /// Identifier assigned by the store (storage key).
    pub id: String,
    pub name: String,
    pub extension: String,
    pub url: String,
    /// Whether the store can serve a preview/thumbnail for this file.
    pub has_preview: bool,
    pub size_bytes: u64,
    pub uploaded_at: DateTime<Utc>,
}
