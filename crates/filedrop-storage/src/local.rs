use crate::keys::{generate_preview_key, generate_upload_key, is_previewable};
use crate::traits::{ProgressSink, TransportError, TransportResult, UploadPayload, UploadTransport};
use crate::StorageBackend;
use async_trait::async_trait;
use chrono::Utc;
use filedrop_core::{normalize_extension, RemoteDescriptor};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Local filesystem upload transport
#[derive(Clone)]
pub struct LocalTransport {
    base_path: PathBuf,
    base_url: String,
    max_file_size: Option<u64>,
    allowed_extensions: Vec<String>,
    chunk_size: usize,
}

impl LocalTransport {
    /// Create a new LocalTransport instance
    ///
    /// # Arguments
    /// * `base_path` - Root directory for uploaded files (e.g., "/var/lib/filedrop")
    /// * `base_url` - Base URL the files are served from (e.g., "http://localhost:3000/files")
    pub async fn new(base_path: impl Into<PathBuf>, base_url: String) -> TransportResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            TransportError::Transport(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalTransport {
            base_path,
            base_url,
            max_file_size: None,
            allowed_extensions: Vec::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        })
    }

    /// Reject files larger than `limit` bytes.
    pub fn with_max_file_size(mut self, limit: Option<u64>) -> Self {
        self.max_file_size = limit;
        self
    }

    /// Only store files with these extensions. Empty allows everything.
    pub fn with_allowed_extensions(mut self, extensions: Vec<String>) -> Self {
        self.allowed_extensions = extensions
            .iter()
            .map(|e| normalize_extension(e))
            .filter(|e| !e.is_empty())
            .collect();
        self
    }

    /// Size of each copy step; one progress report is made per chunk.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Convert storage key to filesystem path with security validation
    ///
    /// Rejects keys containing traversal sequences that could escape the base directory.
    fn key_to_path(&self, storage_key: &str) -> TransportResult<PathBuf> {
        if storage_key.contains("..") || storage_key.starts_with('/') {
            return Err(TransportError::Transport(format!(
                "Invalid storage key: {}",
                storage_key
            )));
        }

        let path = self.base_path.join(storage_key);
        if path.strip_prefix(&self.base_path).is_err() {
            return Err(TransportError::Transport(format!(
                "Storage key resolves outside storage directory: {}",
                storage_key
            )));
        }

        Ok(path)
    }

    /// Generate public URL for file
    fn generate_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), key)
    }

    /// Ensure parent directory exists
    async fn ensure_parent_dir(&self, path: &Path) -> TransportResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    fn validate(&self, extension: Option<&str>, size: u64) -> TransportResult<()> {
        let mut file = Vec::new();
        let mut file_type = Vec::new();

        if let Some(limit) = self.max_file_size {
            if size > limit {
                file.push(format!(
                    "File is too large ({} bytes, maximum is {} bytes)",
                    size, limit
                ));
            }
        }

        if !self.allowed_extensions.is_empty() {
            let allowed = extension.is_some_and(|ext| self.allowed_extensions.iter().any(|a| a == ext));
            if !allowed {
                file_type.push(format!(
                    "File type {} is not allowed (allowed: {})",
                    extension.map(|e| format!(".{}", e)).unwrap_or_else(|| "without extension".to_string()),
                    self.allowed_extensions.join(", ")
                ));
            }
        }

        if file.is_empty() && file_type.is_empty() {
            Ok(())
        } else {
            Err(TransportError::Validation { file, file_type })
        }
    }

    /// Copy `source` into `dest` chunk by chunk through a `.part` file.
    ///
    /// The partial file is removed if the copy fails or the future is dropped.
    async fn copy_with_progress(
        &self,
        source: &Path,
        dest: &Path,
        total: u64,
        progress: &ProgressSink,
    ) -> TransportResult<u64> {
        let part_path = part_path(dest);
        let mut guard = PartFileGuard::new(part_path.clone());

        let mut reader = fs::File::open(source).await?;
        let mut writer = fs::File::create(&part_path).await?;
        let mut buf = vec![0u8; self.chunk_size];
        let mut copied: u64 = 0;

        progress.report(0);
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            writer.write_all(&buf[..n]).await?;
            copied += n as u64;
            progress.report_bytes(copied, total.max(copied));
        }
        if copied == 0 {
            progress.report(100);
        }

        writer.flush().await?;
        writer.sync_all().await?;
        drop(writer);

        fs::rename(&part_path, dest).await?;
        guard.disarm();

        Ok(copied)
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

/// Removes a partially written or half-finished upload unless disarmed.
struct PartFileGuard {
    path: Option<PathBuf>,
}

impl PartFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    fn disarm(&mut self) {
        self.path = None;
    }
}

impl Drop for PartFileGuard {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial upload");
                }
            } else {
                tracing::debug!(path = %path.display(), "Removed partial upload");
            }
        }
    }
}

#[async_trait]
impl UploadTransport for LocalTransport {
    async fn upload(
        &self,
        payload: UploadPayload,
        progress: ProgressSink,
    ) -> TransportResult<RemoteDescriptor> {
        let start = std::time::Instant::now();
        let extension = payload.file.extension();

        let size = match payload.file.size {
            Some(size) => size,
            None => fs::metadata(&payload.file.path).await?.len(),
        };
        self.validate(extension.as_deref(), size)?;

        let key = generate_upload_key(extension.as_deref());
        let path = self.key_to_path(&key)?;
        self.ensure_parent_dir(&path).await?;

        let size_bytes = self
            .copy_with_progress(&payload.file.path, &path, size, &progress)
            .await?;
        // The stored file goes away again if the preview step fails or is aborted.
        let mut stored = PartFileGuard::new(path.clone());

        let has_preview = match &payload.preview {
            Some(preview) => {
                let preview_key = generate_preview_key(preview.extension().as_deref());
                let preview_path = self.key_to_path(&preview_key)?;
                self.ensure_parent_dir(&preview_path).await?;
                fs::copy(&preview.path, &preview_path).await?;
                true
            }
            None => is_previewable(extension.as_deref()),
        };
        stored.disarm();

        let url = self.generate_url(&key);

        tracing::info!(
            path = %path.display(),
            key = %key,
            file = %payload.file.name,
            size_bytes = size_bytes,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local upload successful"
        );

        Ok(RemoteDescriptor {
            id: key,
            name: payload.file.name,
            extension: extension.unwrap_or_default(),
            url,
            has_preview,
            size_bytes,
            uploaded_at: Utc::now(),
        })
    }

    fn backend_type(&self) -> Option<StorageBackend> {
        Some(StorageBackend::Local)
    }
}
