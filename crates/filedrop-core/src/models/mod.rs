//! Domain models for tracked uploads.

pub mod cancel;
pub mod file;
pub mod item;

pub use cancel::CancelHandle;
pub use file::{normalize_extension, LocalFile, RemoteDescriptor};
pub use item::{ItemId, ItemStatus, Snapshot, UploadItem};
