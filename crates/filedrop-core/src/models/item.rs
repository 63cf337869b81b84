use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::Arc;
use uuid::Uuid;

use super::cancel::CancelHandle;
use super::file::{LocalFile, RemoteDescriptor};

/// Opaque identifier assigned to an item when it is enqueued. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(Uuid);

impl ItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ItemId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        self.0.fmt(f)
    }
}

/// Lifecycle state of an upload item.
///
/// `Queued` and `Transforming` are pre-states tracked by the orchestrator; items stored
/// in the queue start at `Uploading`. `Canceled` is only ever observed on the copy handed
/// to listeners when an in-flight item is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Queued,
    Transforming,
    Uploading,
    Uploaded,
    Errored,
    Canceled,
}

impl ItemStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ItemStatus::Uploaded | ItemStatus::Errored | ItemStatus::Canceled
        )
    }
}

impl Display for ItemStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ItemStatus::Queued => write!(f, "queued"),
            ItemStatus::Transforming => write!(f, "transforming"),
            ItemStatus::Uploading => write!(f, "uploading"),
            ItemStatus::Uploaded => write!(f, "uploaded"),
            ItemStatus::Errored => write!(f, "errored"),
            ItemStatus::Canceled => write!(f, "canceled"),
        }
    }
}

/// One tracked file.
#[derive(Debug, Clone)]
pub struct UploadItem {
    pub id: ItemId,
    /// Local payload; `None` once the item represents an already-persisted file.
    pub source: Option<LocalFile>,
    /// Alternate file used only for previews.
    pub preview: Option<LocalFile>,
    pub remote: Option<RemoteDescriptor>,
    pub status: ItemStatus,
    /// 0-100.
    pub progress: u8,
    /// Non-empty only when `status` is `Errored`.
    pub errors: Vec<String>,
    /// Present only while `status` is `Uploading`.
    pub cancel: Option<CancelHandle>,
    pub queued_at: DateTime<Utc>,
}

/// Immutable point-in-time copy of the queue handed to listeners.
pub type Snapshot = Arc<[UploadItem]>;

impl UploadItem {
    /// An item that is already in flight. Items enter the queue in this state.
    pub fn uploading(
        id: ItemId,
        source: LocalFile,
        preview: Option<LocalFile>,
        cancel: CancelHandle,
    ) -> Self {
        Self {
            id,
            source: Some(source),
            preview,
            remote: None,
            status: ItemStatus::Uploading,
            progress: 0,
            errors: Vec::new(),
            cancel: Some(cancel),
            queued_at: Utc::now(),
        }
    }

    /// An item for a file that was uploaded earlier (display or pre-filled lists).
    pub fn preloaded(remote: RemoteDescriptor) -> Self {
        Self {
            id: ItemId::new(),
            source: None,
            preview: None,
            remote: Some(remote),
            status: ItemStatus::Uploaded,
            progress: 100,
            errors: Vec::new(),
            cancel: None,
            queued_at: Utc::now(),
        }
    }

    pub fn display_name(&self) -> &str {
        self.remote
            .as_ref()
            .map(|r| r.name.as_str())
            .or_else(|| self.source.as_ref().map(|s| s.name.as_str()))
            .unwrap_or("")
    }

    pub fn is_uploading(&self) -> bool {
        self.status == ItemStatus::Uploading
    }

    /// Record transport progress. Ignored once the item left `Uploading`.
    pub fn set_progress(&mut self, percent: u8) {
        if self.is_uploading() {
            self.progress = percent.min(100);
        }
    }

    pub fn mark_uploaded(&mut self, remote: RemoteDescriptor) {
        self.remote = Some(remote);
        self.status = ItemStatus::Uploaded;
        self.progress = 100;
        self.errors.clear();
        self.cancel = None;
    }

    pub fn mark_errored(&mut self, errors: Vec<String>) {
        self.status = ItemStatus::Errored;
        self.errors = errors;
        self.cancel = None;
    }

    pub fn mark_canceled(&mut self) {
        self.status = ItemStatus::Canceled;
        self.cancel = None;
    }
}
