#[cfg(feature = "storage-local")]
use crate::LocalTransport;
#[cfg(feature = "storage-memory")]
use crate::MemoryTransport;
use crate::{StorageBackend, TransportResult, UploadTransport};
use filedrop_core::UploaderConfig;
use std::sync::Arc;

/// Create an upload transport based on configuration
pub async fn create_transport(config: &UploaderConfig) -> TransportResult<Arc<dyn UploadTransport>> {
    match config.storage_backend {
        #[cfg(feature = "storage-local")]
        StorageBackend::Local => {
            let transport =
                LocalTransport::new(config.storage_path.clone(), config.base_url.clone())
                    .await?
                    .with_max_file_size(config.max_file_size_bytes)
                    .with_allowed_extensions(config.accepted_extensions.clone());
            tracing::info!(
                path = %config.storage_path.display(),
                "Using local upload transport"
            );
            Ok(Arc::new(transport))
        }

        #[cfg(not(feature = "storage-local"))]
        StorageBackend::Local => Err(crate::TransportError::Transport(
            "Local storage backend not available (storage-local feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-memory")]
        StorageBackend::Memory => {
            tracing::info!("Using in-memory upload transport");
            Ok(Arc::new(MemoryTransport::new()))
        }

        #[cfg(not(feature = "storage-memory"))]
        StorageBackend::Memory => Err(crate::TransportError::Transport(
            "Memory storage backend not available (storage-memory feature not enabled)".to_string(),
        )),
    }
}
