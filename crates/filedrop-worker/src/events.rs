//! Lifecycle events and their delivery.
//!
//! Events are queued in mutation order and delivered one at a time to the current
//! listener. A listener that mutates the queue from inside a callback does not recurse:
//! its events are queued and delivered after the current event returns.

use std::collections::VecDeque;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::{Arc, Mutex, RwLock};

use filedrop_core::{ItemStatus, RemoteDescriptor, Snapshot, UploadItem};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// An item entered the queue and its upload is starting.
    Queued,
    /// An upload finished, successfully or not. Fires once per upload.
    Resolved,
    Uploaded,
    Error,
    Removed,
    /// Fires after every queue mutation.
    FilesChange,
}

impl Display for EventKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            EventKind::Queued => write!(f, "queued"),
            EventKind::Resolved => write!(f, "resolved"),
            EventKind::Uploaded => write!(f, "uploaded"),
            EventKind::Error => write!(f, "error"),
            EventKind::Removed => write!(f, "removed"),
            EventKind::FilesChange => write!(f, "files_change"),
        }
    }
}

/// A lifecycle notification.
#[derive(Debug, Clone)]
pub struct UploadEvent {
    pub kind: EventKind,
    /// The whole queue right after the mutation that produced this event.
    pub items: Snapshot,
    /// The item the event is about. `None` for `FilesChange`.
    pub item: Option<UploadItem>,
    /// Descriptors of every uploaded item in `items`, in queue order.
    pub files: Vec<RemoteDescriptor>,
}

impl UploadEvent {
    pub fn new(kind: EventKind, items: Snapshot, item: Option<UploadItem>) -> Self {
        let files = uploaded_files(&items);
        Self {
            kind,
            items,
            item,
            files,
        }
    }

    pub fn files_change(items: Snapshot) -> Self {
        Self::new(EventKind::FilesChange, items, None)
    }
}

/// Remote descriptors of the uploaded items, in queue order.
pub fn uploaded_files(items: &[UploadItem]) -> Vec<RemoteDescriptor> {
    items
        .iter()
        .filter(|item| item.status == ItemStatus::Uploaded)
        .filter_map(|item| item.remote.clone())
        .collect()
}

/// Lifecycle callbacks. Every method defaults to a no-op.
///
/// Implemented for any `Fn(&UploadEvent)`, which receives every event.
pub trait UploadListener: Send + Sync {
    /// Entry point used by the hub. Dispatches to the per-kind callbacks.
    fn on_event(&self, event: &UploadEvent) {
        match event.kind {
            EventKind::Queued => self.on_file_queued(event),
            EventKind::Resolved => self.on_file_resolved(event),
            EventKind::Uploaded => self.on_file_uploaded(event),
            EventKind::Error => self.on_file_error(event),
            EventKind::Removed => self.on_file_removed(event),
            EventKind::FilesChange => self.on_files_change(event),
        }
    }

    fn on_file_queued(&self, _event: &UploadEvent) {}

    fn on_file_resolved(&self, _event: &UploadEvent) {}

    fn on_file_uploaded(&self, _event: &UploadEvent) {}

    fn on_file_error(&self, _event: &UploadEvent) {}

    fn on_file_removed(&self, _event: &UploadEvent) {}

    fn on_files_change(&self, _event: &UploadEvent) {}
}

impl<F> UploadListener for F
where
    F: Fn(&UploadEvent) + Send + Sync,
{
    fn on_event(&self, event: &UploadEvent) {
        self(event)
    }
}

/// Listener that ignores everything.
pub struct NoOpListener;

impl UploadListener for NoOpListener {}

#[derive(Default)]
struct Pending {
    events: VecDeque<UploadEvent>,
    delivering: bool,
}

/// Ordered event delivery to a replaceable listener.
pub struct EventHub {
    listener: RwLock<Arc<dyn UploadListener>>,
    pending: Mutex<Pending>,
}

impl EventHub {
    pub fn new(listener: Arc<dyn UploadListener>) -> Self {
        Self {
            listener: RwLock::new(listener),
            pending: Mutex::new(Pending::default()),
        }
    }

    /// Replace the listener. Events not yet delivered go to the new one.
    pub fn set_listener(&self, listener: Arc<dyn UploadListener>) {
        *self
            .listener
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = listener;
    }

    pub fn listener(&self) -> Arc<dyn UploadListener> {
        self.listener
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Queue events without delivering them.
    pub fn enqueue<I>(&self, events: I)
    where
        I: IntoIterator<Item = UploadEvent>,
    {
        self.lock_pending().events.extend(events);
    }

    /// Deliver queued events until none are left.
    ///
    /// Returns immediately when another call is already delivering; that call picks up
    /// whatever was queued in the meantime.
    pub fn drain(&self) {
        {
            let mut pending = self.lock_pending();
            if pending.delivering {
                return;
            }
            pending.delivering = true;
        }
        let _panic_guard = DeliveringGuard { hub: self };

        loop {
            // The flag is cleared under the same lock that saw the queue empty.
            let next = {
                let mut pending = self.lock_pending();
                let next = pending.events.pop_front();
                if next.is_none() {
                    pending.delivering = false;
                }
                next
            };
            match next {
                Some(event) => self.deliver(&event),
                None => break,
            }
        }
    }

    /// Queue events and deliver them.
    pub fn emit<I>(&self, events: I)
    where
        I: IntoIterator<Item = UploadEvent>,
    {
        self.enqueue(events);
        self.drain();
    }

    fn deliver(&self, event: &UploadEvent) {
        let listener = self.listener();
        tracing::trace!(
            kind = %event.kind,
            item_id = ?event.item.as_ref().map(|i| i.id),
            items = event.items.len(),
            "Delivering upload event"
        );
        listener.on_event(event);
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, Pending> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(Arc::new(NoOpListener))
    }
}

/// Clears the delivering flag when a listener panics mid-delivery.
struct DeliveringGuard<'a> {
    hub: &'a EventHub,
}

impl Drop for DeliveringGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            let mut pending = self.hub.lock_pending();
            pending.delivering = false;
            // The rest of the batch stays undelivered.
            pending.events.clear();
        }
    }
}
