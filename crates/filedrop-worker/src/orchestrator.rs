//! Upload orchestrator: intake, transform routing, upload dispatch and removal.
//!
//! Each item entering `Uploading` gets its own tokio task. The task is spawned before
//! the item is inserted so its abort handle can be stored as the item's cancel handle,
//! and it waits for a start signal so the transport never runs for an item that is not
//! in the queue.

use std::sync::Arc;
use std::time::Instant;

use filedrop_core::{
    CancelHandle, CapacityNotice, ItemId, ItemStatus, LocalFile, NoOpNoticeSink, NoticeSink,
    RemoteDescriptor, Snapshot, UploadError, UploadItem, UploadResult, UploaderConfig,
};
use filedrop_processing::{
    plan_intake, ExtensionFilter, PassthroughStage, TransformStage, TransformedFile,
};
use filedrop_storage::{ProgressSink, UploadPayload, UploadTransport};
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::{oneshot, watch};

use crate::events::{uploaded_files, EventHub, NoOpListener, UploadListener};
use crate::queue::{Appended, UploadOutcome, UploadQueue};

/// What happened to one `submit` batch.
#[derive(Debug, Default, Serialize)]
pub struct IntakeReport {
    /// Items created and already uploading, in arrival order.
    pub queued: Vec<ItemId>,
    /// Files handed to the transform stage; their items appear as outputs arrive.
    pub transforming: usize,
    /// Files whose extension is not accepted.
    pub rejected: Vec<LocalFile>,
    /// Files left out because the queue was full.
    pub dropped: Vec<LocalFile>,
    pub notice: Option<CapacityNotice>,
}

pub struct OrchestratorBuilder {
    config: UploaderConfig,
    transport: Arc<dyn UploadTransport>,
    transform: Arc<dyn TransformStage>,
    notices: Arc<dyn NoticeSink>,
    listener: Arc<dyn UploadListener>,
}

impl OrchestratorBuilder {
    pub fn config(mut self, config: UploaderConfig) -> Self {
        self.config = config;
        self
    }

    /// Stage used when `transform_enabled` is set.
    pub fn transform_stage(mut self, stage: Arc<dyn TransformStage>) -> Self {
        self.transform = stage;
        self
    }

    pub fn notice_sink(mut self, sink: Arc<dyn NoticeSink>) -> Self {
        self.notices = sink;
        self
    }

    pub fn listener(mut self, listener: Arc<dyn UploadListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn build(self) -> UploadResult<UploadOrchestrator> {
        self.config
            .validate()
            .map_err(|e| UploadError::Config(e.to_string()))?;

        let events = Arc::new(EventHub::new(self.listener));
        let queue = Arc::new(UploadQueue::new(self.config.max_items, Arc::clone(&events)));
        let filter = ExtensionFilter::new(&self.config.accepted_extensions);
        let (pending_transforms, _) = watch::channel(0usize);
        let pending_transforms = Arc::new(pending_transforms);

        tracing::info!(
            accepted = ?filter.accepted(),
            max_items = ?self.config.max_items,
            transform_enabled = self.config.transform_enabled,
            read_only = self.config.read_only,
            "Upload orchestrator ready"
        );

        Ok(UploadOrchestrator {
            inner: Arc::new(Inner {
                config: self.config,
                filter,
                queue,
                events,
                transport: self.transport,
                transform: self.transform,
                notices: self.notices,
                pending_transforms,
            }),
        })
    }
}

struct Inner {
    config: UploaderConfig,
    filter: ExtensionFilter,
    queue: Arc<UploadQueue>,
    events: Arc<EventHub>,
    transport: Arc<dyn UploadTransport>,
    transform: Arc<dyn TransformStage>,
    notices: Arc<dyn NoticeSink>,
    pending_transforms: Arc<watch::Sender<usize>>,
}

/// Coordinates intake, uploads and removal for one upload list.
#[derive(Clone)]
pub struct UploadOrchestrator {
    inner: Arc<Inner>,
}

impl UploadOrchestrator {
    pub fn builder(transport: Arc<dyn UploadTransport>) -> OrchestratorBuilder {
        OrchestratorBuilder {
            config: UploaderConfig::default(),
            transport,
            transform: Arc::new(PassthroughStage),
            notices: Arc::new(NoOpNoticeSink),
            listener: Arc::new(NoOpListener),
        }
    }

    pub fn config(&self) -> &UploaderConfig {
        &self.inner.config
    }

    /// Submit raw files.
    ///
    /// Files with a non-accepted extension are skipped silently. Survivors are truncated
    /// to the remaining capacity (one capacity notice per batch), then either uploaded
    /// right away or handed to the transform stage.
    pub async fn submit(&self, files: Vec<LocalFile>) -> UploadResult<IntakeReport> {
        let inner = &self.inner;
        if inner.config.read_only {
            return Err(UploadError::ReadOnly);
        }

        let submitted = files.len();
        let plan = plan_intake(
            &inner.filter,
            files,
            inner.queue.len(),
            inner.config.max_items,
        );

        let mut report = IntakeReport {
            rejected: plan.rejected,
            dropped: plan.dropped,
            ..Default::default()
        };

        if inner.config.transform_enabled {
            if !plan.accepted.is_empty() {
                report.transforming = plan.accepted.len();
                let guard = PendingTransform::start(&inner.pending_transforms);
                tokio::spawn(run_transform(Arc::clone(inner), plan.accepted, guard));
            }
        } else {
            let outputs = plan.accepted.into_iter().map(TransformedFile::from).collect();
            let appended = dispatch(inner, outputs);
            report.queued = appended.inserted;
            // Another intake may have filled the queue since the plan was made.
            report
                .dropped
                .extend(appended.overflow.into_iter().filter_map(|item| item.source));
        }

        report.notice = CapacityNotice::for_dropped(inner.config.max_items, report.dropped.len());
        if let Some(notice) = report.notice {
            tracing::warn!(
                dropped = notice.dropped,
                limit = notice.limit,
                "Intake batch exceeds capacity"
            );
            inner.notices.capacity_exceeded(notice);
        }

        tracing::info!(
            submitted = submitted,
            queued = report.queued.len(),
            transforming = report.transforming,
            rejected = report.rejected.len(),
            dropped = report.dropped.len(),
            "Intake batch received"
        );

        Ok(report)
    }

    /// Remove an item. An in-flight upload is aborted first.
    pub fn remove(&self, id: ItemId) -> UploadResult<UploadItem> {
        if self.inner.config.read_only {
            return Err(UploadError::ReadOnly);
        }
        let removed = self
            .inner
            .queue
            .remove_by_id(id)
            .ok_or(UploadError::NotFound(id))?;
        tracing::info!(item_id = %id, file = %removed.display_name(), status = %removed.status, "Item removed");
        Ok(removed)
    }

    /// Upload an errored item's file again as a brand new item.
    ///
    /// The errored item is removed; the returned id belongs to the new item.
    pub async fn resubmit(&self, id: ItemId) -> UploadResult<ItemId> {
        let inner = &self.inner;
        if inner.config.read_only {
            return Err(UploadError::ReadOnly);
        }

        let item = inner.queue.get(id).ok_or(UploadError::NotFound(id))?;
        if item.status != ItemStatus::Errored {
            return Err(UploadError::InvalidState {
                id,
                expected: ItemStatus::Errored,
                actual: item.status,
            });
        }
        let source = item.source.ok_or(UploadError::InvalidState {
            id,
            expected: ItemStatus::Errored,
            actual: item.status,
        })?;

        inner.queue.remove_by_id(id);
        let output = TransformedFile {
            payload: source,
            preview: item.preview,
        };
        let new_id = dispatch(inner, vec![output])
            .inserted
            .into_iter()
            .next()
            .ok_or_else(|| UploadError::Internal("queue refused resubmitted item".to_string()))?;

        tracing::info!(item_id = %new_id, previous_id = %id, "Item resubmitted");
        Ok(new_id)
    }

    /// Show already-persisted files. Allowed in read-only mode.
    pub fn preload(&self, descriptors: Vec<RemoteDescriptor>) -> Vec<ItemId> {
        let inner = &self.inner;
        let appended = inner
            .queue
            .append(descriptors.into_iter().map(UploadItem::preloaded).collect());
        if let Some(notice) =
            CapacityNotice::for_dropped(inner.config.max_items, appended.overflow.len())
        {
            tracing::warn!(
                dropped = notice.dropped,
                limit = notice.limit,
                "Preloaded files exceed capacity"
            );
            inner.notices.capacity_exceeded(notice);
        }
        appended.inserted
    }

    /// Abort and remove every in-flight upload. Returns how many were removed.
    pub fn cancel_all(&self) -> usize {
        let ids = self.inner.queue.uploading_ids();
        let removed = ids
            .into_iter()
            .filter_map(|id| self.inner.queue.remove_by_id(id))
            .count();
        if removed > 0 {
            tracing::info!(removed = removed, "Canceled in-flight uploads");
        }
        removed
    }

    /// True while an upload is in flight or a transform batch is open.
    pub fn is_uploading(&self) -> bool {
        is_busy(&self.inner.queue.snapshot(), *self.inner.pending_transforms.borrow())
    }

    /// Wait until nothing is uploading and no transform batch is open.
    pub async fn settled(&self) {
        let mut snapshots = self.inner.queue.subscribe();
        let mut pending = self.inner.pending_transforms.subscribe();
        loop {
            let busy = is_busy(&snapshots.borrow_and_update(), *pending.borrow_and_update());
            if !busy {
                return;
            }
            tokio::select! {
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
                changed = pending.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }
    }

    /// Replace the lifecycle listener. Takes effect for the next delivered event.
    pub fn set_listener(&self, listener: Arc<dyn UploadListener>) {
        self.inner.events.set_listener(listener);
    }

    pub fn snapshot(&self) -> Snapshot {
        self.inner.queue.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.inner.queue.subscribe()
    }

    pub fn get(&self, id: ItemId) -> Option<UploadItem> {
        self.inner.queue.get(id)
    }

    /// Descriptors of every uploaded item, in queue order.
    pub fn files(&self) -> Vec<RemoteDescriptor> {
        uploaded_files(&self.inner.queue.snapshot())
    }
}

fn is_busy(items: &[UploadItem], pending_transforms: usize) -> bool {
    pending_transforms > 0 || items.iter().any(UploadItem::is_uploading)
}

/// Counts an open transform batch for as long as it lives.
struct PendingTransform {
    counter: Arc<watch::Sender<usize>>,
}

impl PendingTransform {
    fn start(counter: &Arc<watch::Sender<usize>>) -> Self {
        counter.send_modify(|n| *n += 1);
        Self {
            counter: Arc::clone(counter),
        }
    }
}

impl Drop for PendingTransform {
    fn drop(&mut self) {
        self.counter.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// Create one in-flight item per output, insert them, then start the uploads of the
/// items that fit.
fn dispatch(inner: &Arc<Inner>, outputs: Vec<TransformedFile>) -> Appended {
    let mut items = Vec::with_capacity(outputs.len());
    let mut starts = Vec::with_capacity(outputs.len());

    for output in outputs {
        let id = ItemId::new();
        let (start_tx, start_rx) = oneshot::channel();
        let payload = UploadPayload::new(output.payload.clone()).with_preview(output.preview.clone());

        let task = tokio::spawn(run_upload(
            id,
            payload,
            start_rx,
            Arc::clone(&inner.queue),
            Arc::clone(&inner.transport),
        ));
        let abort = task.abort_handle();
        let cancel = CancelHandle::new(move || abort.abort());

        items.push(UploadItem::uploading(id, output.payload, output.preview, cancel));
        starts.push((id, start_tx));
    }

    let appended = inner.queue.append(items);
    for (id, start_tx) in starts {
        if appended.inserted.contains(&id) {
            let _ = start_tx.send(());
        }
    }
    appended
}

async fn run_upload(
    id: ItemId,
    payload: UploadPayload,
    start: oneshot::Receiver<()>,
    queue: Arc<UploadQueue>,
    transport: Arc<dyn UploadTransport>,
) {
    if start.await.is_err() {
        return;
    }

    let file = payload.file.name.clone();
    let started = Instant::now();
    let progress = {
        let queue = Arc::clone(&queue);
        ProgressSink::new(move |percent| {
            tracing::debug!(item_id = %id, progress = percent, "Upload progress");
            queue.update_by_id(id, |item| item.set_progress(percent));
        })
    };

    match transport.upload(payload, progress).await {
        Ok(remote) => {
            tracing::info!(
                item_id = %id,
                file = %file,
                size_bytes = remote.size_bytes,
                duration_ms = started.elapsed().as_secs_f64() * 1000.0,
                "Upload completed"
            );
            queue.resolve(id, UploadOutcome::Uploaded(remote));
        }
        Err(e) => {
            let errors = e.messages();
            tracing::warn!(
                item_id = %id,
                file = %file,
                error = %e,
                duration_ms = started.elapsed().as_secs_f64() * 1000.0,
                "Upload failed"
            );
            queue.resolve(id, UploadOutcome::Failed(errors));
        }
    }
}

async fn run_transform(inner: Arc<Inner>, files: Vec<LocalFile>, _pending: PendingTransform) {
    let inputs = files.len();
    let mut outputs = match inner.transform.process(files, inner.filter.accepted()).await {
        Ok(outputs) => outputs,
        Err(e) => {
            tracing::warn!(inputs = inputs, error = %e, "Transform stage failed");
            return;
        }
    };

    let mut produced = 0usize;
    let mut dropped = 0usize;
    while let Some(output) = outputs.next().await {
        produced += 1;
        if dispatch(&inner, vec![output]).inserted.is_empty() {
            dropped += 1;
        }
    }

    if let Some(notice) = CapacityNotice::for_dropped(inner.config.max_items, dropped) {
        tracing::warn!(
            dropped = notice.dropped,
            limit = notice.limit,
            "Transform outputs exceed capacity"
        );
        inner.notices.capacity_exceeded(notice);
    }

    tracing::info!(inputs = inputs, outputs = produced, dropped = dropped, "Transform batch closed");
}
