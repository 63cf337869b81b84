//! Filedrop Worker – upload queue, lifecycle events and the upload orchestrator.
//!
//! The orchestrator accepts raw files, routes them through the optional transform
//! stage, runs one upload task per item and keeps the queue and its listeners in sync.

mod events;
mod orchestrator;
mod queue;

pub use events::{uploaded_files, EventHub, EventKind, NoOpListener, UploadEvent, UploadListener};
pub use orchestrator::{IntakeReport, OrchestratorBuilder, UploadOrchestrator};
pub use queue::{Appended, UploadOutcome, UploadQueue};
