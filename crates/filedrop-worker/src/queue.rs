//! Upload queue: the ordered list of tracked items and the only place they are mutated.
//!
//! Every mutation builds a fresh immutable snapshot, publishes it on a watch channel
//! and queues the resulting lifecycle events while the list is still locked, so events
//! reach listeners in mutation order. Delivery happens after the lock is released.

use std::sync::{Arc, Mutex, MutexGuard};

use filedrop_core::{remaining_capacity, ItemId, ItemStatus, RemoteDescriptor, Snapshot, UploadItem};
use tokio::sync::watch;

use crate::events::{EventHub, EventKind, UploadEvent};

/// Final result of one upload, applied with [`UploadQueue::resolve`].
#[derive(Debug, Clone)]
pub enum UploadOutcome {
    Uploaded(RemoteDescriptor),
    Failed(Vec<String>),
}

/// Result of [`UploadQueue::append`].
#[derive(Debug, Default)]
pub struct Appended {
    /// Ids of the inserted items, in order.
    pub inserted: Vec<ItemId>,
    /// Items that did not fit. Their cancel handles have already run.
    pub overflow: Vec<UploadItem>,
}

pub struct UploadQueue {
    items: Mutex<Vec<UploadItem>>,
    capacity: Option<usize>,
    snapshot_tx: watch::Sender<Snapshot>,
    events: Arc<EventHub>,
}

impl UploadQueue {
    /// Create an empty queue. `capacity` of `None` means unbounded.
    pub fn new(capacity: Option<usize>, events: Arc<EventHub>) -> Self {
        let (snapshot_tx, _) = watch::channel(Snapshot::from(Vec::new()));
        Self {
            items: Mutex::new(Vec::new()),
            capacity,
            snapshot_tx,
            events,
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock_items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn remaining_capacity(&self) -> usize {
        remaining_capacity(self.capacity, self.len())
    }

    /// The latest snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// Receiver that always holds the latest snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot_tx.subscribe()
    }

    /// A copy of the item with this id, if present.
    pub fn get(&self, id: ItemId) -> Option<UploadItem> {
        self.lock_items().iter().find(|item| item.id == id).cloned()
    }

    /// Insert items at the end, keeping their order.
    ///
    /// The capacity split happens under the same lock as the insertion. Items beyond the
    /// remaining capacity are not inserted; their cancel handles are invoked and they
    /// come back in [`Appended::overflow`]. Emits `Queued` for each inserted in-flight
    /// item, then `FilesChange`.
    pub fn append(&self, mut new_items: Vec<UploadItem>) -> Appended {
        let overflow = {
            let mut items = self.lock_items();
            let remaining = remaining_capacity(self.capacity, items.len());
            let overflow = if new_items.len() > remaining {
                new_items.split_off(remaining)
            } else {
                Vec::new()
            };

            if !new_items.is_empty() {
                items.extend(new_items.iter().cloned());
                let snapshot = self.publish(&items);

                let mut events: Vec<UploadEvent> = new_items
                    .iter()
                    .filter(|item| item.is_uploading())
                    .map(|item| {
                        UploadEvent::new(EventKind::Queued, snapshot.clone(), Some(item.clone()))
                    })
                    .collect();
                events.push(UploadEvent::files_change(snapshot));
                self.events.enqueue(events);
            }
            overflow
        };

        for item in &overflow {
            tracing::debug!(item_id = %item.id, file = %item.display_name(), "Item over capacity, not inserted");
            if let Some(cancel) = &item.cancel {
                cancel.cancel();
            }
        }

        self.events.drain();
        Appended {
            inserted: new_items.into_iter().map(|item| item.id).collect(),
            overflow,
        }
    }

    /// Apply `mutator` to the item with this id and emit `FilesChange`.
    ///
    /// Returns `false`, without emitting anything, when the id is not present.
    pub fn update_by_id<F>(&self, id: ItemId, mutator: F) -> bool
    where
        F: FnOnce(&mut UploadItem),
    {
        let found = {
            let mut items = self.lock_items();
            match items.iter_mut().find(|item| item.id == id) {
                Some(item) => {
                    mutator(item);
                    let snapshot = self.publish(&items);
                    self.events.enqueue([UploadEvent::files_change(snapshot)]);
                    true
                }
                None => false,
            }
        };

        if found {
            self.events.drain();
        }
        found
    }

    /// Settle an in-flight upload.
    ///
    /// Emits `Uploaded` or `Error`, then `Resolved`, then `FilesChange`. Returns `false`
    /// without emitting anything when the item is gone or no longer uploading, so an
    /// upload resolves at most once.
    pub fn resolve(&self, id: ItemId, outcome: UploadOutcome) -> bool {
        let resolved = {
            let mut items = self.lock_items();
            let Some(item) = items
                .iter_mut()
                .find(|item| item.id == id && item.status == ItemStatus::Uploading)
            else {
                return false;
            };

            let kind = match outcome {
                UploadOutcome::Uploaded(remote) => {
                    item.mark_uploaded(remote);
                    EventKind::Uploaded
                }
                UploadOutcome::Failed(errors) => {
                    item.mark_errored(errors);
                    EventKind::Error
                }
            };
            let item = item.clone();
            let snapshot = self.publish(&items);
            self.events.enqueue([
                UploadEvent::new(kind, snapshot.clone(), Some(item.clone())),
                UploadEvent::new(EventKind::Resolved, snapshot.clone(), Some(item)),
                UploadEvent::files_change(snapshot),
            ]);
            true
        };

        self.events.drain();
        resolved
    }

    /// Remove the item with this id, invoking its cancel handle first.
    ///
    /// Returns the removed item; an item that was still uploading comes back marked
    /// `Canceled`. Emits `Removed`, then `Resolved` for a canceled upload, then
    /// `FilesChange`.
    pub fn remove_by_id(&self, id: ItemId) -> Option<UploadItem> {
        let cancel = {
            let items = self.lock_items();
            items.iter().find(|item| item.id == id)?.cancel.clone()
        };

        // Runs outside the lock: the handle is arbitrary code.
        if let Some(cancel) = cancel {
            if cancel.cancel() {
                tracing::debug!(item_id = %id, "Upload aborted");
            }
        }

        let removed = {
            let mut items = self.lock_items();
            let index = items.iter().position(|item| item.id == id)?;
            let mut removed = items.remove(index);
            let was_uploading = removed.is_uploading();
            if was_uploading {
                removed.mark_canceled();
            }
            let snapshot = self.publish(&items);
            let mut events = vec![UploadEvent::new(
                EventKind::Removed,
                snapshot.clone(),
                Some(removed.clone()),
            )];
            if was_uploading {
                events.push(UploadEvent::new(
                    EventKind::Resolved,
                    snapshot.clone(),
                    Some(removed.clone()),
                ));
            }
            events.push(UploadEvent::files_change(snapshot));
            self.events.enqueue(events);
            removed
        };

        self.events.drain();
        Some(removed)
    }

    /// Ids of every item still uploading, in queue order.
    pub fn uploading_ids(&self) -> Vec<ItemId> {
        self.lock_items()
            .iter()
            .filter(|item| item.is_uploading())
            .map(|item| item.id)
            .collect()
    }

    fn publish(&self, items: &[UploadItem]) -> Snapshot {
        let snapshot: Snapshot = items.to_vec().into();
        self.snapshot_tx.send_replace(snapshot.clone());
        snapshot
    }

    fn lock_items(&self) -> MutexGuard<'_, Vec<UploadItem>> {
        self.items
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
