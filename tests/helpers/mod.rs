//! In-process stand-in for the colorization backend

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use crate::fixtures;

/// How the stub answers video submissions and status checks
#[derive(Debug, Clone)]
pub enum VideoBehavior {
    /// Accept a task, report `processing` this many times, then complete
    Task { processing_polls: usize },
    /// Answer the upload with an `outputURL` right away
    Direct,
    /// Reject the upload with a 400 and an `{"error"}` body
    Reject(&'static str),
    /// Accept a task that later fails with this message
    Fail(&'static str),
    /// Accept a task, then answer status checks with 404 and an `{"error"}` body
    Lost,
    /// Accept a task that never finishes
    Hang,
}

/// Metadata of one received multipart part
#[derive(Debug, Clone)]
pub struct ReceivedPart {
    pub name: Option<String>,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub len: usize,
}

#[derive(Clone)]
pub struct StubState {
    pub behavior: VideoBehavior,
    pub image_result: Arc<Vec<u8>>,
    pub video_result: Arc<Vec<u8>>,
    pub uploads: Arc<Mutex<Vec<ReceivedPart>>>,
    pub status_calls: Arc<AtomicUsize>,
    pub downloads: Arc<AtomicUsize>,
}

impl StubState {
    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn uploads(&self) -> Vec<ReceivedPart> {
        self.uploads.lock().unwrap().clone()
    }
}

pub struct StubBackend {
    pub base_url: String,
    pub state: StubState,
    _handle: tokio::task::JoinHandle<()>,
}

pub const TASK_ID: &str = "task-abc";

/// Spawn the stub on a random local port
pub async fn spawn_backend(behavior: VideoBehavior) -> StubBackend {
    let state = StubState {
        behavior,
        image_result: Arc::new(fixtures::png_image(640, 480)),
        video_result: Arc::new(fixtures::mp4_bytes(4096)),
        uploads: Arc::new(Mutex::new(Vec::new())),
        status_calls: Arc::new(AtomicUsize::new(0)),
        downloads: Arc::new(AtomicUsize::new(0)),
    };

    let router = Router::new()
        .route("/colorize", post(colorize_image))
        .route("/colorize-video", post(colorize_video))
        .route("/status/{task_id}", get(task_status))
        .route("/files/{name}", get(serve_file))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind to random port");
    let addr = listener.local_addr().expect("get local addr");
    let base_url = format!("http://{}", addr);

    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    StubBackend {
        base_url,
        state,
        _handle: handle,
    }
}

async fn record_parts(state: &StubState, mut multipart: Multipart) {
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().map(str::to_string);
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let len = field.bytes().await.map(|b| b.len()).unwrap_or(0);
        state.uploads.lock().unwrap().push(ReceivedPart {
            name,
            file_name,
            content_type,
            len,
        });
    }
}

async fn colorize_image(State(state): State<StubState>, multipart: Multipart) -> Response {
    record_parts(&state, multipart).await;
    (
        [(header::CONTENT_TYPE, "image/png")],
        state.image_result.as_ref().clone(),
    )
        .into_response()
}

async fn colorize_video(State(state): State<StubState>, multipart: Multipart) -> Response {
    record_parts(&state, multipart).await;
    match state.behavior {
        VideoBehavior::Direct => Json(json!({ "outputURL": "/files/direct.mp4" })).into_response(),
        VideoBehavior::Reject(message) => {
            (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
        }
        VideoBehavior::Task { .. }
        | VideoBehavior::Fail(_)
        | VideoBehavior::Lost
        | VideoBehavior::Hang => {
            Json(json!({ "task_id": TASK_ID })).into_response()
        }
    }
}

async fn task_status(State(state): State<StubState>, Path(task_id): Path<String>) -> Response {
    if task_id != TASK_ID {
        return (StatusCode::NOT_FOUND, "unknown task").into_response();
    }

    let call = state.status_calls.fetch_add(1, Ordering::SeqCst) + 1;
    if let VideoBehavior::Lost = state.behavior {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "Task not found" }))).into_response();
    }
    let body = match state.behavior {
        VideoBehavior::Task { processing_polls } if call <= processing_polls => {
            json!({ "status": "processing", "progress": 0.5 })
        }
        VideoBehavior::Task { .. } => {
            json!({ "status": "completed", "output_url": format!("/files/{TASK_ID}.mp4") })
        }
        VideoBehavior::Fail(message) => json!({ "status": "error", "error": message }),
        _ => json!({ "status": "processing" }),
    };
    Json(body).into_response()
}

async fn serve_file(State(state): State<StubState>, Path(_name): Path<String>) -> Response {
    state.downloads.fetch_add(1, Ordering::SeqCst);
    (
        [(header::CONTENT_TYPE, "video/mp4")],
        state.video_result.as_ref().clone(),
    )
        .into_response()
}
