//! Transform stages
//!
//! A transform stage receives a batch of raw selected files and yields zero or more
//! upload-ready files. The orchestrator inserts each yielded file as an independent
//! item as soon as it arrives, so a stage can fan out, fan in or yield nothing.

use async_trait::async_trait;
use filedrop_core::{LocalFile, UploadError, UploadResult};
use futures::stream::{self, Stream};
use std::pin::Pin;
use tokio::sync::mpsc;

/// One upload-ready output of a transform stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformedFile {
    pub payload: LocalFile,
    /// Alternate file used only to build a preview.
    pub preview: Option<LocalFile>,
}

impl TransformedFile {
    pub fn new(payload: LocalFile) -> Self {
        Self {
            payload,
            preview: None,
        }
    }

    pub fn with_preview(mut self, preview: LocalFile) -> Self {
        self.preview = Some(preview);
        self
    }
}

impl From<LocalFile> for TransformedFile {
    fn from(payload: LocalFile) -> Self {
        Self::new(payload)
    }
}

/// Outputs of one batch. Ends when the batch is finished or canceled.
pub type TransformStream = Pin<Box<dyn Stream<Item = TransformedFile> + Send>>;

/// Transform stage trait
#[async_trait]
pub trait TransformStage: Send + Sync {
    /// Start processing a batch. `accepted` is the normalized accepted-extension set the
    /// outputs are expected to respect.
    async fn process(
        &self,
        files: Vec<LocalFile>,
        accepted: &[String],
    ) -> UploadResult<TransformStream>;
}

/// Yields every input unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughStage;

#[async_trait]
impl TransformStage for PassthroughStage {
    async fn process(
        &self,
        files: Vec<LocalFile>,
        _accepted: &[String],
    ) -> UploadResult<TransformStream> {
        Ok(Box::pin(stream::iter(
            files.into_iter().map(TransformedFile::from),
        )))
    }
}

/// A batch handed to an interactive editor.
///
/// The editor sends outputs with [`TransformRequest::emit`] and closes the batch with
/// [`TransformRequest::finish`] or [`TransformRequest::cancel`]. Dropping the request
/// also closes the batch. Outputs already emitted before a cancel are kept.
#[derive(Debug)]
pub struct TransformRequest {
    pub files: Vec<LocalFile>,
    pub accepted: Vec<String>,
    outputs: mpsc::Sender<TransformedFile>,
}

impl TransformRequest {
    /// Send one output. Returns `false` when the orchestrator stopped listening.
    pub async fn emit(&self, file: TransformedFile) -> bool {
        self.outputs.send(file).await.is_ok()
    }

    pub fn finish(self) {
        tracing::debug!(inputs = self.files.len(), "Transform batch finished");
    }

    pub fn cancel(self) {
        tracing::debug!(inputs = self.files.len(), "Transform batch canceled");
    }
}

/// Hands each batch to an external editor through a channel.
#[derive(Debug, Clone)]
pub struct InteractiveStage {
    requests: mpsc::Sender<TransformRequest>,
    output_buffer: usize,
}

impl InteractiveStage {
    /// Create the stage and the receiving end the editor reads batches from.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<TransformRequest>) {
        let buffer = buffer.max(1);
        let (requests, rx) = mpsc::channel(buffer);
        (
            Self {
                requests,
                output_buffer: buffer,
            },
            rx,
        )
    }
}

#[async_trait]
impl TransformStage for InteractiveStage {
    async fn process(
        &self,
        files: Vec<LocalFile>,
        accepted: &[String],
    ) -> UploadResult<TransformStream> {
        let (outputs, rx) = mpsc::channel(self.output_buffer);
        let request = TransformRequest {
            files,
            accepted: accepted.to_vec(),
            outputs,
        };

        self.requests
            .send(request)
            .await
            .map_err(|_| UploadError::Transform("Transform editor is not connected".to_string()))?;

        Ok(Box::pin(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|file| (file, rx))
        })))
    }
}
