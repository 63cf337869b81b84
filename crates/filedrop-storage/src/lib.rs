//! Filedrop Storage Library
//!
//! This crate provides the upload transport abstraction and its implementations.
//! It includes the `UploadTransport` trait, a local filesystem transport and an
//! in-memory transport.
//!
//! # Storage key format
//!
//! All backends use the same key layout:
//!
//! - **Uploaded files**: `uploads/{uuid}.{ext}`
//! - **Previews**: `previews/{uuid}.{ext}`
//!
//! Keys must not contain `..` or a leading `/`. Key generation is centralized in the
//! `keys` module so all backends stay consistent.

pub mod factory;
pub(crate) mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-memory")]
pub mod memory;
pub mod traits;

// Re-export commonly used types
pub use factory::create_transport;
pub use filedrop_core::StorageBackend;
#[cfg(feature = "storage-local")]
pub use local::LocalTransport;
#[cfg(feature = "storage-memory")]
pub use memory::MemoryTransport;
pub use traits::{
    ProgressSink, TransportError, TransportResult, UploadPayload, UploadTransport,
    UNKNOWN_ERROR_MESSAGE,
};
