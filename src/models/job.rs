use std::path::PathBuf;

use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::models::media::MediaKind;

/// A single colorization request, owned by the flow that submits it.
#[derive(Debug, Clone)]
pub struct UploadJob {
    pub media_bytes: Vec<u8>,
    pub media_kind: MediaKind,
    pub endpoint: Url,
}

impl UploadJob {
    pub fn new(media_bytes: Vec<u8>, media_kind: MediaKind, endpoint: Url) -> Self {
        Self {
            media_bytes,
            media_kind,
            endpoint,
        }
    }
}

/// How the backend answered a submission.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitResponse {
    /// Asynchronous backend: poll `status/{task_id}` until done.
    TaskAccepted { task_id: String },
    /// Synchronous backend returning a reference to the result.
    DirectResult { output_url: String },
    /// Synchronous image backend returning the colorized bytes in the body.
    RawMedia {
        bytes: Vec<u8>,
        content_type: Option<String>,
    },
}

/// Tracks an accepted asynchronous task while it is being polled.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    pub task_id: String,
    pub created_at: DateTime<Utc>,
    poll_count: u32,
    progress: Option<f64>,
}

impl TaskHandle {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            created_at: Utc::now(),
            poll_count: 0,
            progress: None,
        }
    }

    pub fn poll_count(&self) -> u32 {
        self.poll_count
    }

    /// Last progress fraction reported by the backend, in `0.0..=1.0`.
    pub fn progress(&self) -> Option<f64> {
        self.progress
    }

    pub(crate) fn record_attempt(&mut self) -> u32 {
        self.poll_count += 1;
        self.poll_count
    }

    pub(crate) fn set_progress(&mut self, fraction: f64) {
        self.progress = Some(fraction.clamp(0.0, 1.0));
    }
}

/// Body of `GET /status/{task_id}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StatusResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub output_url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Interpretation of a status body.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskState {
    Processing { progress: Option<f64> },
    Completed { output_url: Option<String> },
    Error { message: Option<String> },
    /// Missing or unrecognised status; retried like `Processing`.
    Unknown { status: Option<String> },
}

impl StatusResponse {
    pub fn processing(progress: Option<f64>) -> Self {
        Self {
            status: Some("processing".to_string()),
            progress,
            ..Default::default()
        }
    }

    pub fn completed(output_url: impl Into<String>) -> Self {
        Self {
            status: Some("completed".to_string()),
            output_url: Some(output_url.into()),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some("error".to_string()),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn state(&self) -> TaskState {
        match self.status.as_deref() {
            Some("processing") => TaskState::Processing {
                progress: self.progress,
            },
            Some("completed") => TaskState::Completed {
                output_url: self.output_url.clone().filter(|u| !u.trim().is_empty()),
            },
            Some("error") => TaskState::Error {
                message: self.error.clone().filter(|m| !m.trim().is_empty()),
            },
            other => TaskState::Unknown {
                status: other.map(str::to_string),
            },
        }
    }
}

/// A colorized result stored on local disk.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalFileHandle {
    pub path: PathBuf,
    pub media_kind: MediaKind,
    pub size_bytes: u64,
}

/// Immutable summary of a finished job, for presentation layers.
#[derive(Debug, Clone, PartialEq)]
pub enum JobResult {
    Success { file: LocalFileHandle },
    Failure { kind: ErrorKind, message: String },
}

impl JobResult {
    pub fn is_success(&self) -> bool {
        matches!(self, JobResult::Success { .. })
    }
}

/// Stage of the in-flight job, published over a `watch` channel.
#[derive(Debug, Clone, PartialEq)]
pub enum JobProgress {
    Idle,
    Uploading { kind: MediaKind },
    Processing { attempt: u32, fraction: Option<f64> },
    Downloading,
    Finished,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_states() {
        let body: StatusResponse =
            serde_json::from_str(r#"{"status":"processing","progress":0.4}"#).unwrap();
        assert_eq!(body.state(), TaskState::Processing { progress: Some(0.4) });

        let body: StatusResponse =
            serde_json::from_str(r#"{"status":"completed","output_url":"/out.mp4"}"#).unwrap();
        assert_eq!(
            body.state(),
            TaskState::Completed {
                output_url: Some("/out.mp4".to_string())
            }
        );

        let body: StatusResponse = serde_json::from_str(r#"{"status":"completed"}"#).unwrap();
        assert_eq!(body.state(), TaskState::Completed { output_url: None });

        let body: StatusResponse = serde_json::from_str(r#"{"status":"error"}"#).unwrap();
        assert_eq!(body.state(), TaskState::Error { message: None });
    }

    #[test]
    fn test_unknown_status_is_not_terminal() {
        let body: StatusResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(body.state(), TaskState::Unknown { status: None });

        let body: StatusResponse = serde_json::from_str(r#"{"status":"queued"}"#).unwrap();
        assert_eq!(
            body.state(),
            TaskState::Unknown {
                status: Some("queued".to_string())
            }
        );
    }

    #[test]
    fn test_task_handle_counts_and_clamps() {
        let mut handle = TaskHandle::new("abc");
        assert_eq!(handle.poll_count(), 0);
        assert_eq!(handle.record_attempt(), 1);
        assert_eq!(handle.record_attempt(), 2);

        handle.set_progress(1.7);
        assert_eq!(handle.progress(), Some(1.0));
        handle.set_progress(-0.2);
        assert_eq!(handle.progress(), Some(0.0));
    }
}
