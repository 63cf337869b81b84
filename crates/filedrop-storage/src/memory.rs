use crate::keys::{generate_preview_key, generate_upload_key, is_previewable};
use crate::traits::{ProgressSink, TransportResult, UploadPayload, UploadTransport};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use filedrop_core::RemoteDescriptor;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::fs;

/// In-memory upload transport
///
/// Reads the payload from disk and keeps the bytes in a map keyed by storage key.
/// Clones share the same map.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    objects: Arc<Mutex<HashMap<String, Bytes>>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes stored under `key`, if any.
    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn put(&self, key: String, data: Bytes) {
        self.objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key, data);
    }
}

#[async_trait]
impl UploadTransport for MemoryTransport {
    async fn upload(
        &self,
        payload: UploadPayload,
        progress: ProgressSink,
    ) -> TransportResult<RemoteDescriptor> {
        let extension = payload.file.extension();

        progress.report(0);
        let data = Bytes::from(fs::read(&payload.file.path).await?);
        let size_bytes = data.len() as u64;

        let key = generate_upload_key(extension.as_deref());
        self.put(key.clone(), data);

        let has_preview = match &payload.preview {
            Some(preview) => {
                let preview_data = Bytes::from(fs::read(&preview.path).await?);
                self.put(
                    generate_preview_key(preview.extension().as_deref()),
                    preview_data,
                );
                true
            }
            None => is_previewable(extension.as_deref()),
        };
        progress.report(100);

        tracing::debug!(key = %key, size_bytes = size_bytes, "Memory upload stored");

        Ok(RemoteDescriptor {
            url: format!("memory://{}", key),
            id: key,
            name: payload.file.name,
            extension: extension.unwrap_or_default(),
            has_preview,
            size_bytes,
            uploaded_at: Utc::now(),
        })
    }

    fn backend_type(&self) -> Option<StorageBackend> {
        Some(StorageBackend::Memory)
    }
}
