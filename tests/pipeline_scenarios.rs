mod common;

use auto_uploader::config::{StabilitySettings, WatchConfig};
use auto_uploader::events::{EventBus, UploadEventPayload};
use auto_uploader::file_watcher::{DirectoryWatcher, DispatchOutcome, WatchEvent, WatchEventKind};
use auto_uploader::upload_queue::UploadErrorKind;
use common::{fast_options, isolate_home, next_outcome, MockEndpoint};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn start(dir: &std::path::Path, endpoint: &MockEndpoint, bus: &EventBus) -> DirectoryWatcher {
    DirectoryWatcher::start(
        WatchConfig::new(dir, endpoint.url.clone(), "secret-token", None),
        fast_options(),
        bus.clone(),
    )
    .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn growing_file_is_uploaded_once_with_final_size() {
    isolate_home();
    let endpoint = MockEndpoint::spawn(vec![]);
    let dir = tempfile::tempdir().unwrap();
    let bus = EventBus::new(64);
    let mut rx = bus.subscribe();
    let mut watcher = start(dir.path(), &endpoint, &bus);

    let path = dir.path().join("clip.wbmomo");
    let mut file = std::fs::File::create(&path).unwrap();
    for _ in 0..4 {
        file.write_all(&[7u8; 512]).unwrap();
        file.flush().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    drop(file);

    let outcome = next_outcome(&mut rx).await;
    match outcome.payload {
        UploadEventPayload::UploadSucceeded {
            status,
            attempts,
            bytes,
            ..
        } => {
            assert_eq!(status, 200);
            assert_eq!(attempts, 1);
            assert_eq!(bytes, 2048);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }

    // Late notifications for the same write must not cause a second upload
    tokio::time::sleep(Duration::from_millis(500)).await;
    let requests = endpoint.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].file_name.as_deref(), Some("clip.wbmomo"));
    assert_eq!(requests[0].bytes.len(), 2048);
    assert_eq!(requests[0].token.as_deref(), Some("secret-token"));

    watcher.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unavailable_endpoint_status_is_retried_once() {
    isolate_home();
    let endpoint = MockEndpoint::spawn(vec![503, 200]);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clip.wbmomo");
    std::fs::write(&path, vec![1u8; 1024]).unwrap();

    let bus = EventBus::new(64);
    let mut rx = bus.subscribe();
    let mut watcher = start(dir.path(), &endpoint, &bus);

    assert_eq!(
        watcher.inject(&WatchEvent::new(WatchEventKind::Created, &path)),
        DispatchOutcome::Queued
    );

    match next_outcome(&mut rx).await.payload {
        UploadEventPayload::UploadSucceeded { status, attempts, .. } => {
            assert_eq!(status, 200);
            assert_eq!(attempts, 2);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(endpoint.request_count(), 2);

    watcher.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_failure_is_terminal() {
    isolate_home();
    let endpoint = MockEndpoint::spawn(vec![500, 500, 500]);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clip.wbmomo");
    std::fs::write(&path, b"payload").unwrap();

    let bus = EventBus::new(64);
    let mut rx = bus.subscribe();
    let mut watcher = start(dir.path(), &endpoint, &bus);

    watcher.inject(&WatchEvent::new(WatchEventKind::Created, &path));

    match next_outcome(&mut rx).await.payload {
        UploadEventPayload::UploadFailed { kind, status, .. } => {
            assert_eq!(kind, UploadErrorKind::UnsuccessfulResponse);
            assert_eq!(status, Some(500));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(endpoint.request_count(), 2);

    watcher.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn burst_of_events_for_one_path_uploads_once() {
    isolate_home();
    let endpoint = MockEndpoint::spawn(vec![]);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clip.wbmomo");
    std::fs::write(&path, vec![3u8; 256]).unwrap();

    let bus = EventBus::new(64);
    let mut rx = bus.subscribe();
    let mut watcher = start(dir.path(), &endpoint, &bus);

    assert_eq!(
        watcher.inject(&WatchEvent::new(WatchEventKind::Created, &path)),
        DispatchOutcome::Queued
    );
    assert_eq!(
        watcher.inject(&WatchEvent::new(WatchEventKind::WriteClosed, &path)),
        DispatchOutcome::Duplicate
    );

    next_outcome(&mut rx).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(endpoint.request_count(), 1);

    watcher.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn path_is_accepted_again_after_completion() {
    isolate_home();
    let endpoint = MockEndpoint::spawn(vec![]);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clip.wbmomo");
    std::fs::write(&path, vec![9u8; 64]).unwrap();

    let bus = EventBus::new(64);
    let mut rx = bus.subscribe();
    let mut watcher = start(dir.path(), &endpoint, &bus);

    watcher.inject(&WatchEvent::new(WatchEventKind::Created, &path));
    next_outcome(&mut rx).await;
    assert!(watcher.in_flight().is_empty());

    assert_eq!(
        watcher.inject(&WatchEvent::new(WatchEventKind::WriteClosed, &path)),
        DispatchOutcome::Queued
    );
    next_outcome(&mut rx).await;

    assert_eq!(endpoint.request_count(), 2);
    watcher.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn non_matching_files_are_never_uploaded() {
    isolate_home();
    let endpoint = MockEndpoint::spawn(vec![]);
    let dir = tempfile::tempdir().unwrap();

    let bus = EventBus::new(64);
    let mut rx = bus.subscribe();
    let mut watcher = start(dir.path(), &endpoint, &bus);

    std::fs::write(dir.path().join("notes.txt"), b"ignore me").unwrap();
    std::fs::write(dir.path().join("clip.wbmomo.part"), b"ignore me too").unwrap();
    std::fs::write(dir.path().join("CLIP.WBMOMO"), b"upload me").unwrap();

    let outcome = next_outcome(&mut rx).await;
    assert!(!outcome.is_failure());

    tokio::time::sleep(Duration::from_millis(500)).await;
    let requests = endpoint.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].file_name.as_deref(), Some("CLIP.WBMOMO"));
    assert_eq!(requests[0].bytes, b"upload me");

    watcher.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn nothing_is_uploaded_after_stop() {
    isolate_home();
    let endpoint = MockEndpoint::spawn(vec![]);
    let dir = tempfile::tempdir().unwrap();

    let bus = EventBus::new(64);
    let mut watcher = start(dir.path(), &endpoint, &bus);
    watcher.shutdown().await;
    assert!(!watcher.is_running());

    std::fs::write(dir.path().join("late.wbmomo"), b"too late").unwrap();
    assert_eq!(
        watcher.inject(&WatchEvent::new(
            WatchEventKind::Created,
            dir.path().join("late.wbmomo")
        )),
        DispatchOutcome::Stopped
    );

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(endpoint.request_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn vanished_file_is_reported_unreadable() {
    isolate_home();
    let endpoint = MockEndpoint::spawn(vec![]);
    let dir = tempfile::tempdir().unwrap();

    let bus = EventBus::new(64);
    let mut rx = bus.subscribe();
    let mut watcher = start(dir.path(), &endpoint, &bus);

    watcher.inject(&WatchEvent::new(
        WatchEventKind::MovedInto,
        dir.path().join("ghost.wbmomo"),
    ));

    match next_outcome(&mut rx).await.payload {
        UploadEventPayload::UploadFailed { kind, status, .. } => {
            assert_eq!(kind, UploadErrorKind::FileUnreadable);
            assert_eq!(status, None);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(endpoint.request_count(), 0);

    watcher.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn file_that_never_settles_is_still_uploaded_intact() {
    isolate_home();
    let endpoint = MockEndpoint::spawn(vec![]);
    let dir = tempfile::tempdir().unwrap();

    let mut options = fast_options();
    options.stability = StabilitySettings {
        interval_ms: 50,
        max_attempts: 4,
        fallback_delay_ms: 100,
    };

    let bus = EventBus::new(256);
    let mut rx = bus.subscribe();
    let mut watcher = DirectoryWatcher::start(
        WatchConfig::new(dir.path(), endpoint.url.clone(), "secret-token", None),
        options,
        bus.clone(),
    )
    .unwrap();

    // Keep appending through the whole sampling window; the file stays open
    let path = dir.path().join("stream.wbmomo");
    let writing = Arc::new(AtomicBool::new(true));
    let writer = {
        let path = path.clone();
        let writing = Arc::clone(&writing);
        std::thread::spawn(move || {
            let mut file = std::fs::File::create(&path).unwrap();
            while writing.load(Ordering::Relaxed) {
                file.write_all(&[4u8; 256]).unwrap();
                std::thread::sleep(Duration::from_millis(10));
            }
            file
        })
    };

    let mut seen = Vec::new();
    let outcome = tokio::time::timeout(Duration::from_secs(15), async {
        loop {
            let event = rx.recv().await.unwrap();
            seen.push(event.payload_type().to_string());
            if matches!(
                event.payload,
                UploadEventPayload::UploadSucceeded { .. } | UploadEventPayload::UploadFailed { .. }
            ) {
                return event;
            }
        }
    })
    .await
    .unwrap();

    let bytes = match outcome.payload {
        UploadEventPayload::UploadSucceeded { bytes, attempts, .. } => {
            assert_eq!(attempts, 1);
            bytes
        }
        other => panic!("unexpected outcome: {:?}", other),
    };
    assert_eq!(seen, vec!["watch_started", "file_queued", "upload_succeeded"]);

    let requests = endpoint.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].field_order, vec!["file", "token"]);
    assert_eq!(requests[0].file_name.as_deref(), Some("stream.wbmomo"));
    assert_eq!(requests[0].token.as_deref(), Some("secret-token"));
    assert!(bytes > 0);
    assert_eq!(requests[0].bytes.len() as u64, bytes);

    // Stop before the writer closes the file so its close event is not picked up
    watcher.shutdown().await;
    writing.store(false, Ordering::Relaxed);
    drop(writer.join().unwrap());
    assert_eq!(endpoint.request_count(), 1);
}
