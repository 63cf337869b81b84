//! Shared pieces of the `filedrop` binary.

use filedrop_core::{CapacityNotice, NoticeSink};
use filedrop_worker::{UploadEvent, UploadListener};

/// Truncate a string to max_len characters, appending "..." if truncated.
///
/// The result never exceeds max_len characters; below 3 the ellipsis itself is cut.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len < 3 {
        ".".repeat(max_len)
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{}...", kept)
    }
}

/// Logs lifecycle events through `tracing`.
#[derive(Debug, Default)]
pub struct ConsoleListener {
    name_width: usize,
}

impl ConsoleListener {
    pub fn new(name_width: usize) -> Self {
        Self { name_width }
    }

    fn name(&self, event: &UploadEvent) -> String {
        let name = event
            .item
            .as_ref()
            .map(|item| item.display_name())
            .unwrap_or_default();
        if self.name_width == 0 {
            name.to_string()
        } else {
            truncate_string(name, self.name_width)
        }
    }
}

impl UploadListener for ConsoleListener {
    fn on_file_queued(&self, event: &UploadEvent) {
        tracing::info!(file = %self.name(event), "Upload started");
    }

    fn on_file_uploaded(&self, event: &UploadEvent) {
        let remote = event.item.as_ref().and_then(|item| item.remote.as_ref());
        tracing::info!(
            file = %self.name(event),
            url = remote.map(|r| r.url.as_str()).unwrap_or_default(),
            size_bytes = remote.map(|r| r.size_bytes).unwrap_or_default(),
            "Upload finished"
        );
    }

    fn on_file_error(&self, event: &UploadEvent) {
        let errors = event
            .item
            .as_ref()
            .map(|item| item.errors.join("; "))
            .unwrap_or_default();
        tracing::warn!(file = %self.name(event), errors = %errors, "Upload failed");
    }

    fn on_file_removed(&self, event: &UploadEvent) {
        tracing::info!(file = %self.name(event), "Upload removed");
    }

    fn on_files_change(&self, event: &UploadEvent) {
        for item in event.items.iter().filter(|item| item.is_uploading()) {
            tracing::debug!(
                file = %item.display_name(),
                progress = item.progress,
                "Upload progress"
            );
        }
    }
}

/// Logs capacity notices as warnings.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNoticeSink;

impl NoticeSink for LogNoticeSink {
    fn capacity_exceeded(&self, notice: CapacityNotice) {
        tracing::warn!(dropped = notice.dropped, limit = notice.limit, "{}", notice);
    }
}

/// Initialize tracing for CLI binaries.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}
