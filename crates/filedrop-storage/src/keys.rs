//! Shared key generation for upload backends.
//!
//! Key format: `uploads/{uuid}.{ext}` for uploaded files and `previews/{uuid}.{ext}` for
//! preview copies. The extension is omitted when the file has none.

use uuid::Uuid;

const UPLOAD_PREFIX: &str = "uploads";
const PREVIEW_PREFIX: &str = "previews";

/// Extensions the store can render a preview for without a separate preview file.
const PREVIEWABLE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp", "svg"];

fn generate_key(prefix: &str, extension: Option<&str>) -> String {
    match extension {
        Some(ext) if !ext.is_empty() => format!("{}/{}.{}", prefix, Uuid::new_v4(), ext),
        _ => format!("{}/{}", prefix, Uuid::new_v4()),
    }
}

/// Generate a storage key for an uploaded file.
pub fn generate_upload_key(extension: Option<&str>) -> String {
    generate_key(UPLOAD_PREFIX, extension)
}

/// Generate a storage key for a preview copy.
pub fn generate_preview_key(extension: Option<&str>) -> String {
    generate_key(PREVIEW_PREFIX, extension)
}

/// True when the store can preview a file with this (normalized) extension directly.
pub fn is_previewable(extension: Option<&str>) -> bool {
    extension.is_some_and(|ext| PREVIEWABLE_EXTENSIONS.contains(&ext))
}
