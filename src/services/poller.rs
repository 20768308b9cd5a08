//! Status polling for asynchronously processed tasks.
//!
//! The poller drives an explicit loop: one status request per attempt, a
//! fixed delay between attempts, and a hard cap on the number of attempts.
//! Only "not done yet" answers are retried; a transport failure or an
//! unreadable body ends the task immediately.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::{ColorizerConfig, ConfigError, Endpoints};
use crate::error::ErrorKind;
use crate::models::job::{JobProgress, StatusResponse, TaskHandle, TaskState};
use crate::services::uploader::USER_AGENT;

/// Message used when the backend reports an error without details.
const GENERIC_SERVER_ERROR: &str = "Processing failed on the server";

/// Source of task status answers.
#[async_trait]
pub trait TaskStatusSource: Send + Sync {
    async fn fetch_status(&self, task_id: &str) -> Result<StatusResponse, PollError>;
}

/// Reads task status from `GET {base}/status/{task_id}`.
pub struct HttpStatusSource {
    http: Client,
    endpoints: Endpoints,
}

impl HttpStatusSource {
    pub fn new(endpoints: Endpoints) -> Result<Self, ConfigError> {
        let http = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { http, endpoints })
    }
}

#[async_trait]
impl TaskStatusSource for HttpStatusSource {
    async fn fetch_status(&self, task_id: &str) -> Result<StatusResponse, PollError> {
        let url = self.endpoints.status(task_id);
        let response = self.http.get(url).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        decode_status_response(status, &body)
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Interpret a status response. Non-2xx answers are terminal: an `{"error"}`
/// body is reported as the server's message, anything else as the status.
pub fn decode_status_response(status: StatusCode, body: &[u8]) -> Result<StatusResponse, PollError> {
    if !status.is_success() {
        return match serde_json::from_slice::<ErrorBody>(body) {
            Ok(err) => Err(PollError::ServerReported(err.error)),
            Err(_) => Err(PollError::HttpStatus {
                status: status.as_u16(),
            }),
        };
    }

    Ok(serde_json::from_slice(body)?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 120,
        }
    }
}

impl From<&ColorizerConfig> for PollSettings {
    fn from(config: &ColorizerConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            max_attempts: config.max_poll_attempts,
        }
    }
}

pub struct JobPoller<S> {
    source: S,
    settings: PollSettings,
}

impl<S: TaskStatusSource> JobPoller<S> {
    pub fn new(source: S, settings: PollSettings) -> Self {
        Self { source, settings }
    }

    pub fn settings(&self) -> PollSettings {
        self.settings
    }

    /// Poll until the task completes, fails, times out or is cancelled.
    ///
    /// Returns the output URL exactly as reported by the backend. Each
    /// attempt increments `handle`'s poll count; progress fractions are
    /// recorded on the handle and published to `progress` when given.
    pub async fn poll(
        &self,
        handle: &mut TaskHandle,
        cancel: &CancellationToken,
        progress: Option<&watch::Sender<JobProgress>>,
    ) -> Result<String, PollError> {
        loop {
            if handle.poll_count() >= self.settings.max_attempts {
                tracing::warn!(
                    task_id = %handle.task_id,
                    attempts = handle.poll_count(),
                    "Task did not finish within the attempt limit"
                );
                return Err(PollError::Timeout {
                    attempts: handle.poll_count(),
                });
            }

            if handle.poll_count() > 0 {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(PollError::Cancelled),
                    _ = tokio::time::sleep(self.settings.interval) => {}
                }
            }

            let answer = tokio::select! {
                _ = cancel.cancelled() => return Err(PollError::Cancelled),
                answer = self.source.fetch_status(&handle.task_id) => answer,
            };
            let attempt = handle.record_attempt();
            metrics::counter!("colorize_poll_attempts").increment(1);

            let answer = answer.inspect_err(|e| {
                tracing::error!(task_id = %handle.task_id, attempt, error = %e, "Status request failed");
            })?;

            match answer.state() {
                TaskState::Completed {
                    output_url: Some(url),
                } => {
                    tracing::info!(task_id = %handle.task_id, attempt, output_url = %url, "Task completed");
                    return Ok(url);
                }
                TaskState::Completed { output_url: None } => {
                    tracing::error!(task_id = %handle.task_id, attempt, "Task completed without an output URL");
                    return Err(PollError::NoOutputUrl);
                }
                TaskState::Error { message } => {
                    let message = message.unwrap_or_else(|| GENERIC_SERVER_ERROR.to_string());
                    tracing::error!(task_id = %handle.task_id, attempt, error = %message, "Task failed on server");
                    return Err(PollError::ServerReported(message));
                }
                TaskState::Processing { progress: fraction } => {
                    if let Some(fraction) = fraction {
                        handle.set_progress(fraction);
                    }
                    tracing::debug!(
                        task_id = %handle.task_id,
                        attempt,
                        progress = handle.progress().unwrap_or_default(),
                        "Task still processing"
                    );
                }
                TaskState::Unknown { status } => {
                    tracing::debug!(
                        task_id = %handle.task_id,
                        attempt,
                        status = status.as_deref().unwrap_or("<missing>"),
                        "Unrecognised task status, retrying"
                    );
                }
            }

            if let Some(tx) = progress {
                tx.send_replace(JobProgress::Processing {
                    attempt,
                    fraction: handle.progress(),
                });
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("Status request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Status endpoint returned HTTP {status}")]
    HttpStatus { status: u16 },

    #[error("Unreadable status response: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Task failed: {0}")]
    ServerReported(String),

    #[error("Task completed without an output URL")]
    NoOutputUrl,

    #[error("Task did not finish after {attempts} status checks")]
    Timeout { attempts: u32 },

    #[error("Polling cancelled")]
    Cancelled,
}

impl PollError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PollError::Transport(_) | PollError::HttpStatus { .. } => ErrorKind::Transport,
            PollError::Malformed(_) | PollError::NoOutputUrl => ErrorKind::MalformedResponse,
            PollError::ServerReported(_) => ErrorKind::ServerReported,
            PollError::Timeout { .. } => ErrorKind::Timeout,
            PollError::Cancelled => ErrorKind::Cancelled,
        }
    }
}
