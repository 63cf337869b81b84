//! Orchestrator integration tests driven by a scripted transport.
//!
//! Run with: `cargo test -p filedrop-worker --test orchestrator_test`

mod helpers;

use std::sync::Arc;

use filedrop_core::{CapacityNotice, ItemStatus, LocalFile, UploaderConfig};
use filedrop_processing::{InteractiveStage, TransformedFile};
use filedrop_storage::{LocalTransport, TransportError};
use filedrop_worker::{EventKind, UploadOrchestrator};
use helpers::{descriptor, files, next_call, NoticeRecorder, Recorder, ScriptedTransport, TIMEOUT};

async fn settle(orchestrator: &UploadOrchestrator) {
    tokio::time::timeout(TIMEOUT, orchestrator.settled())
        .await
        .expect("orchestrator did not settle");
}

#[tokio::test]
async fn test_capacity_and_extension_filter() {
    let (transport, mut calls) = ScriptedTransport::new();
    let notices = NoticeRecorder::default();
    let orchestrator = UploadOrchestrator::builder(transport)
        .config(UploaderConfig {
            accepted_extensions: vec![".png".to_string()],
            max_items: Some(2),
            ..Default::default()
        })
        .notice_sink(notices.sink())
        .build()
        .unwrap();

    let report = orchestrator
        .submit(files(&["a.png", "b.jpg", "c.png", "d.png"]))
        .await
        .unwrap();

    let names: Vec<String> = orchestrator
        .snapshot()
        .iter()
        .map(|item| item.display_name().to_string())
        .collect();
    assert_eq!(names, vec!["a.png", "c.png"]);
    assert_eq!(report.queued.len(), 2);
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.dropped.len(), 1);
    assert_eq!(
        notices.notices(),
        vec![CapacityNotice {
            dropped: 1,
            limit: 2
        }]
    );

    next_call(&mut calls).await.succeed();
    next_call(&mut calls).await.succeed();
    settle(&orchestrator).await;

    // The queue is full: a further submission creates nothing.
    let report = orchestrator.submit(files(&["e.png"])).await.unwrap();
    assert!(report.queued.is_empty());
    assert_eq!(orchestrator.snapshot().len(), 2);
    assert_eq!(notices.notices().len(), 2);
}

#[tokio::test]
async fn test_progress_then_success() {
    let (transport, mut calls) = ScriptedTransport::new();
    let recorder = Recorder::default();
    let orchestrator = UploadOrchestrator::builder(transport)
        .listener(recorder.listener())
        .build()
        .unwrap();

    let report = orchestrator.submit(files(&["photo.png"])).await.unwrap();
    let id = report.queued[0];
    assert_eq!(recorder.kinds(), vec![EventKind::Queued, EventKind::FilesChange]);
    assert!(orchestrator.is_uploading());

    let call = next_call(&mut calls).await;
    assert_eq!(call.name(), "photo.png");
    let mut progress_seen = Vec::new();
    for percent in [0u8, 40, 100] {
        call.progress.report(percent);
        progress_seen.push(orchestrator.get(id).unwrap().progress);
    }
    assert_eq!(progress_seen, vec![0, 40, 100]);
    assert_eq!(orchestrator.get(id).unwrap().status, ItemStatus::Uploading);

    assert!(call.succeed());
    settle(&orchestrator).await;

    let item = orchestrator.get(id).unwrap();
    assert_eq!(item.status, ItemStatus::Uploaded);
    assert_eq!(item.progress, 100);
    assert!(item.cancel.is_none());
    let remote = item.remote.as_ref().unwrap();
    assert_eq!(remote.id, "uploads/photo.png");
    assert_eq!(remote.name, "photo.png");
    assert_eq!(recorder.count(EventKind::Uploaded, id), 1);
    assert_eq!(recorder.count(EventKind::Resolved, id), 1);
    assert_eq!(recorder.count(EventKind::Error, id), 0);

    // Uploaded, then Resolved, then FilesChange, with nothing in between.
    let kinds = recorder.kinds();
    let at = kinds.iter().position(|k| *k == EventKind::Uploaded).unwrap();
    assert_eq!(
        &kinds[at..],
        &[EventKind::Uploaded, EventKind::Resolved, EventKind::FilesChange]
    );

    let last = recorder.events().pop().unwrap();
    assert_eq!(last.files.len(), 1);
    assert!(!orchestrator.is_uploading());
}

#[tokio::test]
async fn test_every_item_reaches_a_final_state() {
    let (transport, mut calls) = ScriptedTransport::new();
    let recorder = Recorder::default();
    let orchestrator = UploadOrchestrator::builder(transport)
        .listener(recorder.listener())
        .build()
        .unwrap();

    let report = orchestrator
        .submit(files(&["a.png", "b.png", "c.png", "d.png"]))
        .await
        .unwrap();
    assert_eq!(report.queued.len(), 4);

    let mut pending = Vec::new();
    for _ in 0..4 {
        pending.push(next_call(&mut calls).await);
    }
    pending.sort_by(|a, b| a.name().cmp(b.name()));
    let mut pending = pending.into_iter();

    pending.next().unwrap().succeed();
    pending.next().unwrap().fail(TransportError::Validation {
        file: vec!["File is too large".to_string()],
        file_type: vec!["Type not allowed".to_string()],
    });
    pending.next().unwrap().fail(TransportError::Transport(String::new()));
    pending.next().unwrap().fail(TransportError::Validation {
        file: Vec::new(),
        file_type: vec!["Type not allowed".to_string()],
    });
    settle(&orchestrator).await;

    let snapshot = orchestrator.snapshot();
    let errors: Vec<(ItemStatus, Vec<String>)> = snapshot
        .iter()
        .map(|item| (item.status, item.errors.clone()))
        .collect();
    assert_eq!(
        errors,
        vec![
            (ItemStatus::Uploaded, vec![]),
            (ItemStatus::Errored, vec!["File is too large".to_string()]),
            (ItemStatus::Errored, vec!["Unknown error".to_string()]),
            (ItemStatus::Errored, vec!["Type not allowed".to_string()]),
        ]
    );

    for id in &report.queued {
        assert_eq!(recorder.count(EventKind::Queued, *id), 1);
        assert_eq!(recorder.count(EventKind::Resolved, *id), 1);
    }
    assert_eq!(orchestrator.files().len(), 1);
}

#[tokio::test]
async fn test_remove_uploading_item_aborts_transport() {
    let (transport, mut calls) = ScriptedTransport::new();
    let recorder = Recorder::default();
    let orchestrator = UploadOrchestrator::builder(transport)
        .listener(recorder.listener())
        .build()
        .unwrap();

    let report = orchestrator.submit(files(&["a.png"])).await.unwrap();
    let id = report.queued[0];
    let mut call = next_call(&mut calls).await;
    call.progress.report(30);

    let removed = orchestrator.remove(id).unwrap();
    assert_eq!(removed.status, ItemStatus::Canceled);
    assert!(orchestrator.get(id).is_none());

    tokio::time::timeout(TIMEOUT, call.aborted())
        .await
        .expect("upload future was not dropped");

    // The canceled upload still resolves, exactly once.
    assert_eq!(
        recorder.kinds_for(id),
        vec![EventKind::Queued, EventKind::Removed, EventKind::Resolved]
    );
    let resolved = recorder
        .events()
        .into_iter()
        .find(|e| e.kind == EventKind::Resolved)
        .unwrap();
    assert_eq!(resolved.item.unwrap().status, ItemStatus::Canceled);

    // Late callbacks after removal change nothing and emit nothing.
    recorder.clear();
    let (progress, reply) = call.into_parts();
    progress.report(90);
    assert!(reply.send(Ok(descriptor("a.png"))).is_err());
    settle(&orchestrator).await;

    assert!(recorder.events().is_empty());
    assert!(orchestrator.snapshot().is_empty());

    // Removing twice reports the item as gone.
    assert!(orchestrator.remove(id).is_err());
}

#[tokio::test]
async fn test_remove_event_order() {
    let (transport, mut calls) = ScriptedTransport::new();
    let recorder = Recorder::default();
    let orchestrator = UploadOrchestrator::builder(transport)
        .listener(recorder.listener())
        .build()
        .unwrap();

    let report = orchestrator.submit(files(&["a.png"])).await.unwrap();
    next_call(&mut calls).await.succeed();
    settle(&orchestrator).await;

    recorder.clear();
    let removed = orchestrator.remove(report.queued[0]).unwrap();
    assert_eq!(removed.status, ItemStatus::Uploaded);
    assert_eq!(recorder.kinds(), vec![EventKind::Removed, EventKind::FilesChange]);
    let last = recorder.events().pop().unwrap();
    assert!(last.items.is_empty());
    assert!(last.files.is_empty());
}

#[tokio::test]
async fn test_transform_fan_out() {
    let (transport, mut calls) = ScriptedTransport::new();
    let (stage, mut requests) = InteractiveStage::channel(4);
    let recorder = Recorder::default();
    let orchestrator = UploadOrchestrator::builder(transport)
        .config(UploaderConfig {
            transform_enabled: true,
            ..Default::default()
        })
        .transform_stage(Arc::new(stage))
        .listener(recorder.listener())
        .build()
        .unwrap();

    let report = orchestrator.submit(files(&["scan.png"])).await.unwrap();
    assert!(report.queued.is_empty());
    assert_eq!(report.transforming, 1);
    assert!(orchestrator.is_uploading());

    let request = tokio::time::timeout(TIMEOUT, requests.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(request.files.len(), 1);
    let source = request.files[0].clone();
    assert!(
        request
            .emit(TransformedFile::new(source.clone().with_name("page-1.png")))
            .await
    );
    assert!(
        request
            .emit(
                TransformedFile::new(source.with_name("page-2.png"))
                    .with_preview(LocalFile::new("/tmp/filedrop-test/page-2.jpg"))
            )
            .await
    );
    request.finish();

    let mut pending = vec![next_call(&mut calls).await, next_call(&mut calls).await];
    pending.sort_by(|a, b| a.name().cmp(b.name()));
    let second = pending.pop().unwrap();
    let mut first = pending.pop().unwrap();
    assert_eq!(first.name(), "page-1.png");
    assert_eq!(second.name(), "page-2.png");
    assert!(second.payload.preview.is_some());

    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.len(), 2);
    assert_ne!(snapshot[0].id, snapshot[1].id);
    assert!(snapshot.iter().all(|item| item.progress == 0));
    let (page_1, page_2) = (snapshot[0].id, snapshot[1].id);

    // Cancelling one output leaves the other untouched.
    orchestrator.remove(page_1).unwrap();
    tokio::time::timeout(TIMEOUT, first.aborted()).await.unwrap();
    assert!(second.succeed());
    settle(&orchestrator).await;

    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].id, page_2);
    assert_eq!(snapshot[0].status, ItemStatus::Uploaded);
    assert_eq!(recorder.count(EventKind::Resolved, page_1), 1);
    assert_eq!(recorder.count(EventKind::Resolved, page_2), 1);
    assert_eq!(recorder.count(EventKind::Uploaded, page_1), 0);
}

#[tokio::test]
async fn test_transform_cancel_creates_nothing() {
    let (transport, _calls) = ScriptedTransport::new();
    let (stage, mut requests) = InteractiveStage::channel(1);
    let orchestrator = UploadOrchestrator::builder(transport)
        .config(UploaderConfig {
            transform_enabled: true,
            ..Default::default()
        })
        .transform_stage(Arc::new(stage))
        .build()
        .unwrap();

    orchestrator.submit(files(&["scan.png"])).await.unwrap();
    let request = tokio::time::timeout(TIMEOUT, requests.recv())
        .await
        .unwrap()
        .unwrap();
    request.cancel();

    settle(&orchestrator).await;
    assert!(orchestrator.snapshot().is_empty());
    assert!(!orchestrator.is_uploading());
}

#[tokio::test]
async fn test_transform_outputs_rechecked_against_capacity() {
    let (transport, mut calls) = ScriptedTransport::new();
    let (stage, mut requests) = InteractiveStage::channel(4);
    let notices = NoticeRecorder::default();
    let orchestrator = UploadOrchestrator::builder(transport)
        .config(UploaderConfig {
            transform_enabled: true,
            max_items: Some(2),
            ..Default::default()
        })
        .transform_stage(Arc::new(stage))
        .notice_sink(notices.sink())
        .build()
        .unwrap();

    orchestrator.submit(files(&["scan.png"])).await.unwrap();
    let request = tokio::time::timeout(TIMEOUT, requests.recv())
        .await
        .unwrap()
        .unwrap();
    for page in ["p1.png", "p2.png", "p3.png"] {
        request
            .emit(TransformedFile::new(LocalFile::new(format!("/tmp/{}", page))))
            .await;
    }
    request.finish();

    next_call(&mut calls).await.succeed();
    next_call(&mut calls).await.succeed();
    settle(&orchestrator).await;

    assert_eq!(orchestrator.snapshot().len(), 2);
    assert_eq!(
        notices.notices(),
        vec![CapacityNotice {
            dropped: 1,
            limit: 2
        }]
    );
}

#[tokio::test]
async fn test_resubmit_errored_item() {
    let (transport, mut calls) = ScriptedTransport::new();
    let orchestrator = UploadOrchestrator::builder(transport).build().unwrap();

    let report = orchestrator.submit(files(&["a.png"])).await.unwrap();
    let old_id = report.queued[0];
    next_call(&mut calls)
        .await
        .fail(TransportError::Transport("connection reset".to_string()));
    settle(&orchestrator).await;
    assert_eq!(
        orchestrator.get(old_id).unwrap().errors,
        vec!["connection reset"]
    );

    let new_id = orchestrator.resubmit(old_id).await.unwrap();
    assert_ne!(new_id, old_id);
    assert!(orchestrator.get(old_id).is_none());

    let call = next_call(&mut calls).await;
    assert_eq!(call.name(), "a.png");
    call.succeed();
    settle(&orchestrator).await;

    let item = orchestrator.get(new_id).unwrap();
    assert_eq!(item.status, ItemStatus::Uploaded);
    assert!(item.errors.is_empty());
}

#[tokio::test]
async fn test_listener_replaced_mid_flight() {
    let (transport, mut calls) = ScriptedTransport::new();
    let first = Recorder::default();
    let second = Recorder::default();
    let orchestrator = UploadOrchestrator::builder(transport)
        .listener(first.listener())
        .build()
        .unwrap();

    let report = orchestrator.submit(files(&["a.png"])).await.unwrap();
    let call = next_call(&mut calls).await;
    orchestrator.set_listener(second.listener());
    call.succeed();
    settle(&orchestrator).await;

    let id = report.queued[0];
    assert_eq!(first.count(EventKind::Queued, id), 1);
    assert_eq!(first.count(EventKind::Resolved, id), 0);
    assert_eq!(second.count(EventKind::Resolved, id), 1);
}

#[tokio::test]
async fn test_settled_with_nothing_to_do() {
    let (transport, _calls) = ScriptedTransport::new();
    let orchestrator = UploadOrchestrator::builder(transport).build().unwrap();
    settle(&orchestrator).await;
    assert!(!orchestrator.is_uploading());
}

#[tokio::test]
async fn test_local_transport_end_to_end() {
    let src = tempfile::tempdir().unwrap();
    let store = tempfile::tempdir().unwrap();
    std::fs::write(src.path().join("a.png"), vec![7u8; 300_000]).unwrap();
    std::fs::write(src.path().join("b.txt"), b"ignored").unwrap();

    let transport = LocalTransport::new(store.path(), "http://localhost:3000/files".to_string())
        .await
        .unwrap();
    let recorder = Recorder::default();
    let orchestrator = UploadOrchestrator::builder(Arc::new(transport))
        .config(UploaderConfig {
            accepted_extensions: vec!["png".to_string()],
            ..Default::default()
        })
        .listener(recorder.listener())
        .build()
        .unwrap();

    let report = orchestrator
        .submit(vec![
            LocalFile::new(src.path().join("a.png")),
            LocalFile::new(src.path().join("b.txt")),
        ])
        .await
        .unwrap();
    assert_eq!(report.queued.len(), 1);
    settle(&orchestrator).await;

    let uploaded = orchestrator.files();
    assert_eq!(uploaded.len(), 1);
    assert_eq!(uploaded[0].size_bytes, 300_000);
    assert!(store.path().join(&uploaded[0].id).is_file());
    assert_eq!(recorder.count(EventKind::Resolved, report.queued[0]), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_intake_reports_every_dropped_file() {
    for _ in 0..200 {
        let (transport, _calls) = ScriptedTransport::new();
        let notices = NoticeRecorder::default();
        let orchestrator = UploadOrchestrator::builder(transport)
            .config(UploaderConfig {
                max_items: Some(1),
                ..Default::default()
            })
            .notice_sink(notices.sink())
            .build()
            .unwrap();

        let barrier = Arc::new(tokio::sync::Barrier::new(2));
        let submits: Vec<_> = ["a.png", "b.png"]
            .into_iter()
            .map(|name| {
                let orchestrator = orchestrator.clone();
                let barrier = Arc::clone(&barrier);
                tokio::spawn(async move {
                    barrier.wait().await;
                    orchestrator.submit(files(&[name])).await.unwrap()
                })
            })
            .collect();

        let mut queued = 0;
        let mut dropped = 0;
        for submit in submits {
            let report = submit.await.unwrap();
            queued += report.queued.len();
            dropped += report.dropped.len();
            assert_eq!(report.notice.map_or(0, |n| n.dropped), report.dropped.len());
        }

        assert_eq!(queued, 1);
        assert_eq!(dropped, 1);
        assert_eq!(orchestrator.snapshot().len(), 1);
        assert_eq!(
            notices.notices(),
            vec![CapacityNotice {
                dropped: 1,
                limit: 1
            }]
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_uploads_deliver_every_event_in_order() {
    const FILES: usize = 24;

    let (transport, mut calls) = ScriptedTransport::new();
    let recorder = Recorder::default();
    let orchestrator = UploadOrchestrator::builder(transport)
        .listener(recorder.listener())
        .build()
        .unwrap();

    let names: Vec<String> = (0..FILES).map(|i| format!("f{}.png", i)).collect();
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let report = orchestrator.submit(files(&name_refs)).await.unwrap();
    assert_eq!(report.queued.len(), FILES);

    // Answer every call from its own task so completions race each other.
    let mut answers = Vec::with_capacity(FILES);
    for _ in 0..FILES {
        let call = next_call(&mut calls).await;
        answers.push(tokio::spawn(async move {
            call.progress.report(50);
            call.succeed();
        }));
    }
    for answer in answers {
        answer.await.unwrap();
    }
    settle(&orchestrator).await;

    // The final snapshot event may still be in delivery on another worker.
    tokio::time::timeout(TIMEOUT, async {
        loop {
            let done = recorder.events().last().is_some_and(|e| {
                e.kind == EventKind::FilesChange && e.files.len() == FILES
            });
            if done {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("final events were not delivered");

    for id in &report.queued {
        assert_eq!(
            recorder.kinds_for(*id),
            vec![EventKind::Queued, EventKind::Uploaded, EventKind::Resolved]
        );
    }

    // Snapshots never go backwards: the uploaded count only grows.
    let counts: Vec<usize> = recorder.events().iter().map(|e| e.files.len()).collect();
    assert!(counts.windows(2).all(|w| w[0] <= w[1]));
}
