//! Filedrop Core Library
//!
//! This crate provides the domain models, error types and configuration shared by
//! the transport, processing and orchestration crates.

pub mod capacity;
pub mod config;
pub mod error;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use capacity::{remaining_capacity, CapacityNotice, NoOpNoticeSink, NoticeSink};
pub use config::UploaderConfig;
pub use error::{ErrorMetadata, LogLevel, UploadError, UploadResult};
pub use models::{
    normalize_extension, CancelHandle, ItemId, ItemStatus, LocalFile, RemoteDescriptor,
    Snapshot, UploadItem,
};
pub use storage_types::StorageBackend;
