//! End-to-end colorization against an in-process stub backend
//!
//! Run with: cargo test --test e2e_test -- --nocapture

mod fixtures;
mod helpers;

use std::sync::Arc;
use std::time::Duration;

use colorizer_client::config::ColorizerConfig;
use colorizer_client::error::ErrorKind;
use colorizer_client::models::job::{JobProgress, JobResult};
use colorizer_client::models::media::MediaKind;
use colorizer_client::services::colorizer::Colorizer;
use colorizer_client::services::fetcher::ResultFetcher;
use colorizer_client::services::history::HistoryStore;
use colorizer_client::services::kv::MemoryKeyValueStore;
use helpers::*;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

struct Harness {
    backend: StubBackend,
    colorizer: Colorizer,
    history: Arc<HistoryStore>,
    results: TempDir,
}

async fn harness(behavior: VideoBehavior) -> Harness {
    let backend = spawn_backend(behavior).await;
    let config = ColorizerConfig {
        poll_interval_ms: 20,
        max_poll_attempts: 50,
        ..ColorizerConfig::new(&backend.base_url)
    };

    let history = Arc::new(HistoryStore::new(Arc::new(MemoryKeyValueStore::new())));
    let results = tempfile::tempdir().expect("create result dir");
    let fetcher = ResultFetcher::new(&config)
        .expect("build fetcher")
        .with_temp_dir(results.path());
    let colorizer = Colorizer::new(&config, history.clone())
        .expect("build colorizer")
        .with_fetcher(fetcher);

    Harness {
        backend,
        colorizer,
        history,
        results,
    }
}

#[tokio::test]
async fn test_image_is_colorized_synchronously() {
    let h = harness(VideoBehavior::Direct).await;
    let job = h.colorizer.job(fixtures::jpeg_photo(), MediaKind::Image);

    let outcome = h
        .colorizer
        .run(job, None, &CancellationToken::new())
        .await
        .expect("image colorization");

    // Uploaded as a single "file" part with the fixed image metadata
    let uploads = h.backend.state.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].name.as_deref(), Some("file"));
    assert_eq!(uploads[0].file_name.as_deref(), Some("image.jpg"));
    assert_eq!(uploads[0].content_type.as_deref(), Some("image/jpeg"));
    assert!(uploads[0].len > 0);

    // Result is the served PNG, stored under the result dir
    assert!(outcome.task.is_none());
    assert!(outcome.file.path.starts_with(h.results.path()));
    assert_eq!(outcome.file.path.extension().unwrap(), "png");
    let stored = std::fs::read(&outcome.file.path).unwrap();
    assert_eq!(stored, *h.backend.state.image_result);
    assert_eq!(outcome.file.size_bytes, stored.len() as u64);
    assert_eq!(h.backend.state.status_calls(), 0);

    // History holds an image entry with a bounded JPEG thumbnail
    let entries = h.history.all().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(Some(entries[0].id), outcome.history_entry);
    assert_eq!(entries[0].media_kind, MediaKind::Image);
    assert!(entries[0].file_reference.is_none());
    let thumb = image::load_from_memory(entries[0].thumbnail.as_deref().unwrap()).unwrap();
    assert_eq!((thumb.width(), thumb.height()), (300, 225));

    assert_eq!(*h.colorizer.subscribe().borrow(), JobProgress::Finished);
    println!("✓ Image colorized to {}", outcome.file.path.display());
}

#[tokio::test]
async fn test_video_task_is_polled_until_complete() {
    let h = harness(VideoBehavior::Task { processing_polls: 1 }).await;
    let job = h.colorizer.job(fixtures::mp4_bytes(2048), MediaKind::Video);
    let thumbnail = fixtures::png_image(800, 600);

    let outcome = h
        .colorizer
        .run(job, Some(thumbnail), &CancellationToken::new())
        .await
        .expect("video colorization");

    let uploads = h.backend.state.uploads();
    assert_eq!(uploads[0].file_name.as_deref(), Some("video.mp4"));
    assert_eq!(uploads[0].content_type.as_deref(), Some("video/mp4"));
    assert_eq!(uploads[0].len, 2048);

    let task = outcome.task.expect("task handle");
    assert_eq!(task.task_id, TASK_ID);
    assert_eq!(task.poll_count(), 2);
    assert_eq!(h.backend.state.status_calls(), 2);
    assert_eq!(h.backend.state.downloads(), 1);

    assert_eq!(outcome.file.media_kind, MediaKind::Video);
    assert_eq!(outcome.file.path.extension().unwrap(), "mp4");
    assert_eq!(
        std::fs::read(&outcome.file.path).unwrap(),
        *h.backend.state.video_result
    );

    let entries = h.history.all().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].media_kind, MediaKind::Video);
    let reference = entries[0].file_reference.as_deref().unwrap();
    assert!(reference.starts_with("file://"));
    assert!(reference.ends_with(".mp4"));
    let thumb = image::load_from_memory(entries[0].thumbnail.as_deref().unwrap()).unwrap();
    assert!(thumb.width() <= 300 && thumb.height() <= 300);
}

#[tokio::test]
async fn test_video_direct_output_url_skips_polling() {
    let h = harness(VideoBehavior::Direct).await;
    let job = h.colorizer.job(fixtures::mp4_bytes(512), MediaKind::Video);

    let outcome = h
        .colorizer
        .run(job, None, &CancellationToken::new())
        .await
        .expect("direct result");

    assert!(outcome.task.is_none());
    assert_eq!(h.backend.state.status_calls(), 0);
    assert_eq!(h.backend.state.downloads(), 1);
    assert_eq!(
        std::fs::read(&outcome.file.path).unwrap(),
        *h.backend.state.video_result
    );

    let entries = h.history.all().await;
    assert_eq!(entries.len(), 1);
    assert!(entries[0].thumbnail.is_none());
}

#[tokio::test]
async fn test_rejected_upload_reports_server_message() {
    let h = harness(VideoBehavior::Reject("Unsupported video format")).await;
    let job = h.colorizer.job(fixtures::mp4_bytes(256), MediaKind::Video);

    let err = h
        .colorizer
        .run(job, None, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ServerReported);
    assert!(err.to_string().contains("Unsupported video format"));
    assert_eq!(h.backend.state.status_calls(), 0);
    assert!(h.history.is_empty().await);
}

#[tokio::test]
async fn test_failed_task_surfaces_error_and_records_nothing() {
    let h = harness(VideoBehavior::Fail("bad file")).await;
    let job = h.colorizer.job(fixtures::mp4_bytes(256), MediaKind::Video);

    let result = h.colorizer.run_job(job, None, &CancellationToken::new()).await;

    match result {
        JobResult::Failure { kind, message } => {
            assert_eq!(kind, ErrorKind::ServerReported);
            assert!(message.contains("bad file"), "unexpected message: {message}");
        }
        JobResult::Success { .. } => panic!("expected failure"),
    }
    assert_eq!(h.backend.state.status_calls(), 1);
    assert_eq!(h.backend.state.downloads(), 0);
    assert!(h.history.is_empty().await);
    assert_eq!(std::fs::read_dir(h.results.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_missing_task_fails_without_retrying() {
    let h = harness(VideoBehavior::Lost).await;
    let job = h.colorizer.job(fixtures::mp4_bytes(256), MediaKind::Video);

    let err = h
        .colorizer
        .run(job, None, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ServerReported);
    assert!(err.to_string().contains("Task not found"));
    assert_eq!(h.backend.state.status_calls(), 1);
    assert!(h.history.is_empty().await);
}

#[tokio::test]
async fn test_cancellation_stops_polling() {
    let h = harness(VideoBehavior::Hang).await;
    let job = h.colorizer.job(fixtures::mp4_bytes(256), MediaKind::Video);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        trigger.cancel();
    });

    let err = h.colorizer.run(job, None, &cancel).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);

    let calls = h.backend.state.status_calls();
    assert!(calls >= 1);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.backend.state.status_calls(), calls);
    assert_eq!(h.backend.state.downloads(), 0);
    assert!(h.history.is_empty().await);
}

#[tokio::test]
async fn test_unreachable_backend_is_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let config = ColorizerConfig::new(base_url);
    let history = Arc::new(HistoryStore::new(Arc::new(MemoryKeyValueStore::new())));
    let colorizer = Colorizer::new(&config, history).unwrap();
    let job = colorizer.job(fixtures::jpeg_photo(), MediaKind::Image);

    let err = colorizer
        .run(job, None, &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
}
