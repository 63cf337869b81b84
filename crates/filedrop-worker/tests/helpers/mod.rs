//! Shared fixtures for orchestrator tests: a transport whose calls are answered by the
//! test, and a listener that records every event.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use filedrop_core::{CapacityNotice, ItemId, LocalFile, NoticeSink, RemoteDescriptor};
use filedrop_storage::{
    ProgressSink, TransportError, TransportResult, UploadPayload, UploadTransport,
};
use filedrop_worker::{EventKind, UploadEvent, UploadListener};
use tokio::sync::{mpsc, oneshot};

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// One pending transport call. The test decides how it ends.
pub struct TransportCall {
    pub payload: UploadPayload,
    pub progress: ProgressSink,
    reply: oneshot::Sender<TransportResult<RemoteDescriptor>>,
}

impl TransportCall {
    pub fn name(&self) -> &str {
        &self.payload.file.name
    }

    /// Complete successfully. Returns `false` if the upload was already aborted.
    pub fn succeed(self) -> bool {
        let remote = descriptor(&self.payload.file.name);
        self.reply.send(Ok(remote)).is_ok()
    }

    pub fn fail(self, error: TransportError) -> bool {
        self.reply.send(Err(error)).is_ok()
    }

    /// Resolves once the orchestrator dropped the upload future.
    pub async fn aborted(&mut self) {
        self.reply.closed().await
    }

    /// Split off the reply channel so progress can still be reported afterwards.
    pub fn into_parts(self) -> (ProgressSink, oneshot::Sender<TransportResult<RemoteDescriptor>>) {
        (self.progress, self.reply)
    }
}

/// Transport that forwards every call to the test.
pub struct ScriptedTransport {
    calls: mpsc::UnboundedSender<TransportCall>,
}

impl ScriptedTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<TransportCall>) {
        let (calls, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { calls }), rx)
    }
}

#[async_trait]
impl UploadTransport for ScriptedTransport {
    async fn upload(
        &self,
        payload: UploadPayload,
        progress: ProgressSink,
    ) -> TransportResult<RemoteDescriptor> {
        let (reply, rx) = oneshot::channel();
        self.calls
            .send(TransportCall {
                payload,
                progress,
                reply,
            })
            .map_err(|_| TransportError::Transport("test harness gone".to_string()))?;
        rx.await.unwrap_or(Err(TransportError::Aborted))
    }
}

pub fn descriptor(name: &str) -> RemoteDescriptor {
    RemoteDescriptor {
        id: format!("uploads/{}", name),
        name: name.to_string(),
        extension: name.rsplit('.').next().unwrap_or_default().to_string(),
        url: format!("memory://uploads/{}", name),
        has_preview: false,
        size_bytes: 42,
        uploaded_at: Utc::now(),
    }
}

pub fn files(names: &[&str]) -> Vec<LocalFile> {
    names
        .iter()
        .map(|n| LocalFile::new(format!("/tmp/filedrop-test/{}", n)))
        .collect()
}

pub async fn next_call(calls: &mut mpsc::UnboundedReceiver<TransportCall>) -> TransportCall {
    tokio::time::timeout(TIMEOUT, calls.recv())
        .await
        .expect("timed out waiting for a transport call")
        .expect("transport dropped")
}

/// Everything a listener saw.
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<UploadEvent>>>,
}

impl Recorder {
    pub fn listener(&self) -> Arc<dyn UploadListener> {
        let events = Arc::clone(&self.events);
        Arc::new(move |e: &UploadEvent| events.lock().unwrap().push(e.clone()))
    }

    pub fn events(&self) -> Vec<UploadEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events().iter().map(|e| e.kind).collect()
    }

    /// Kinds of the events about one item.
    pub fn kinds_for(&self, id: ItemId) -> Vec<EventKind> {
        self.events()
            .iter()
            .filter(|e| e.item.as_ref().map(|i| i.id) == Some(id))
            .map(|e| e.kind)
            .collect()
    }

    pub fn count(&self, kind: EventKind, id: ItemId) -> usize {
        self.kinds_for(id).into_iter().filter(|k| *k == kind).count()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

#[derive(Clone, Default)]
pub struct NoticeRecorder {
    notices: Arc<Mutex<Vec<CapacityNotice>>>,
}

impl NoticeRecorder {
    pub fn sink(&self) -> Arc<dyn NoticeSink> {
        let notices = Arc::clone(&self.notices);
        Arc::new(move |n: CapacityNotice| notices.lock().unwrap().push(n))
    }

    pub fn notices(&self) -> Vec<CapacityNotice> {
        self.notices.lock().unwrap().clone()
    }
}
