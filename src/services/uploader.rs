use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::config::{ColorizerConfig, ConfigError};
use crate::error::ErrorKind;
use crate::models::job::{SubmitResponse, UploadJob};
use crate::models::media::MediaKind;

pub(crate) const USER_AGENT: &str = concat!("colorizer-client/", env!("CARGO_PKG_VERSION"));

/// Form field carrying the media file.
pub const FILE_FIELD: &str = "file";

/// Maximum number of body bytes quoted in error messages.
const BODY_EXCERPT_LEN: usize = 256;

/// Submits media to the colorization backend.
pub struct MediaUploader {
    http: Client,
    video_http: Client,
    video_resource_timeout: Duration,
}

#[derive(Deserialize)]
struct TaskAcceptedBody {
    task_id: String,
}

#[derive(Deserialize)]
struct DirectResultBody {
    #[serde(rename = "outputURL", alias = "output_url")]
    output_url: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl MediaUploader {
    /// Images go through a client with transport defaults; videos use one with
    /// an extended idle timeout plus a per-request transfer timeout.
    pub fn new(config: &ColorizerConfig) -> Result<Self, ConfigError> {
        let http = Client::builder().user_agent(USER_AGENT).build()?;

        let video_http = Client::builder()
            .user_agent(USER_AGENT)
            .read_timeout(config.video_request_timeout())
            .build()?;

        Ok(Self {
            http,
            video_http,
            video_resource_timeout: config.video_resource_timeout(),
        })
    }

    /// Upload `job.media_bytes` as the `file` part of a multipart POST.
    pub async fn submit(
        &self,
        job: &UploadJob,
        cancel: &CancellationToken,
    ) -> Result<SubmitResponse, UploadError> {
        let form = file_form(job)?;

        tracing::info!(
            kind = %job.media_kind,
            bytes = job.media_bytes.len(),
            endpoint = %job.endpoint,
            "Submitting media for colorization"
        );

        let request = match job.media_kind {
            MediaKind::Image => self.http.post(job.endpoint.clone()),
            MediaKind::Video => self
                .video_http
                .post(job.endpoint.clone())
                .timeout(self.video_resource_timeout),
        };
        let request = request.multipart(form);

        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let bytes = response.bytes().await?;
            Ok::<_, UploadError>((status, content_type, bytes))
        };

        let (status, content_type, bytes) = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(endpoint = %job.endpoint, "Upload cancelled");
                return Err(UploadError::Cancelled);
            }
            result = exchange => result?,
        };

        tracing::debug!(
            status = status.as_u16(),
            content_type = content_type.as_deref().unwrap_or(""),
            bytes = bytes.len(),
            "Submission response received"
        );

        decode_submit_response(job.media_kind, status, content_type.as_deref(), &bytes)
    }
}

/// Single-part form with the media under [`FILE_FIELD`]. reqwest picks a
/// fresh random boundary for every form.
fn file_form(job: &UploadJob) -> Result<Form, UploadError> {
    let part = Part::bytes(job.media_bytes.clone())
        .file_name(job.media_kind.upload_filename())
        .mime_str(job.media_kind.content_type())?;
    Ok(Form::new().part(FILE_FIELD, part))
}

/// Interpret a submission response.
///
/// JSON shapes are tried in a fixed order: a task id first, then a direct
/// output URL. Image submissions additionally accept the colorized image
/// itself as the body.
pub fn decode_submit_response(
    kind: MediaKind,
    status: StatusCode,
    content_type: Option<&str>,
    body: &[u8],
) -> Result<SubmitResponse, UploadError> {
    if !status.is_success() {
        if let Ok(err) = serde_json::from_slice::<ErrorBody>(body) {
            return Err(UploadError::ServerReported {
                status: status.as_u16(),
                message: err.error,
            });
        }
        return Err(UploadError::HttpStatus {
            status: status.as_u16(),
            body: excerpt(body),
        });
    }

    if let Ok(accepted) = serde_json::from_slice::<TaskAcceptedBody>(body) {
        if !accepted.task_id.trim().is_empty() {
            return Ok(SubmitResponse::TaskAccepted {
                task_id: accepted.task_id,
            });
        }
    }

    if let Ok(direct) = serde_json::from_slice::<DirectResultBody>(body) {
        if !direct.output_url.trim().is_empty() {
            return Ok(SubmitResponse::DirectResult {
                output_url: direct.output_url,
            });
        }
    }

    if let Ok(err) = serde_json::from_slice::<ErrorBody>(body) {
        return Err(UploadError::ServerReported {
            status: status.as_u16(),
            message: err.error,
        });
    }

    if body.is_empty() {
        return Err(UploadError::MalformedResponse("empty response body".to_string()));
    }

    if kind == MediaKind::Image {
        let declared_image = content_type.is_some_and(|ct| ct.starts_with("image/"));
        if declared_image || image::guess_format(body).is_ok() {
            return Ok(SubmitResponse::RawMedia {
                bytes: body.to_vec(),
                content_type: content_type.map(str::to_string),
            });
        }
    }

    Err(UploadError::MalformedResponse(format!(
        "neither task_id nor outputURL in body: {}",
        excerpt(body)
    )))
}

fn excerpt(body: &[u8]) -> String {
    let end = body.len().min(BODY_EXCERPT_LEN);
    String::from_utf8_lossy(&body[..end]).into_owned()
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Upload request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Backend returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Backend reported an error (HTTP {status}): {message}")]
    ServerReported { status: u16, message: String },

    #[error("Malformed submission response: {0}")]
    MalformedResponse(String),

    #[error("Upload cancelled")]
    Cancelled,
}

impl UploadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            UploadError::Transport(_) | UploadError::HttpStatus { .. } => ErrorKind::Transport,
            UploadError::ServerReported { .. } => ErrorKind::ServerReported,
            UploadError::MalformedResponse(_) => ErrorKind::MalformedResponse,
            UploadError::Cancelled => ErrorKind::Cancelled,
        }
    }
}
