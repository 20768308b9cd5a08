use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::{Client, Url};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::{ColorizerConfig, ConfigError};
use crate::error::ErrorKind;
use crate::models::job::LocalFileHandle;
use crate::models::media::MediaKind;
use crate::services::uploader::USER_AGENT;

/// Downloads colorized results into uniquely named local files.
pub struct ResultFetcher {
    http: Client,
    timeout: Duration,
    temp_dir: PathBuf,
}

impl ResultFetcher {
    pub fn new(config: &ColorizerConfig) -> Result<Self, ConfigError> {
        let http = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            http,
            timeout: config.download_timeout(),
            temp_dir: std::env::temp_dir(),
        })
    }

    /// Write results under `dir` instead of the system temp directory.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    /// GET `url` and store the full body in a fresh local file.
    pub async fn download(
        &self,
        url: Url,
        kind: MediaKind,
        cancel: &CancellationToken,
    ) -> Result<LocalFileHandle, FetchError> {
        tracing::info!(url = %url, kind = %kind, "Downloading colorized result");

        let extension = extension_from_url(&url).unwrap_or_else(|| kind.default_extension().to_string());

        let exchange = async {
            let response = self.http.get(url.clone()).timeout(self.timeout).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::HttpStatus {
                    status: status.as_u16(),
                });
            }
            Ok(response.bytes().await?)
        };

        let body = tokio::select! {
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            result = exchange => result?,
        };

        self.write(&body, kind, &extension).await
    }

    /// Store bytes the backend returned inline (synchronous image path).
    pub async fn store(&self, bytes: &[u8], kind: MediaKind) -> Result<LocalFileHandle, FetchError> {
        let extension = image::guess_format(bytes)
            .ok()
            .and_then(|format| format.extensions_str().first().copied())
            .unwrap_or(kind.default_extension());
        self.write(bytes, kind, extension).await
    }

    async fn write(&self, bytes: &[u8], kind: MediaKind, extension: &str) -> Result<LocalFileHandle, FetchError> {
        if bytes.is_empty() {
            return Err(FetchError::NoData);
        }

        tokio::fs::create_dir_all(&self.temp_dir)
            .await
            .map_err(FetchError::WriteFailed)?;

        let path = self
            .temp_dir
            .join(format!("colorized-{}.{}", Uuid::new_v4(), extension));
        tokio::fs::write(&path, bytes)
            .await
            .map_err(FetchError::WriteFailed)?;

        tracing::info!(path = %path.display(), bytes = bytes.len(), "Result stored locally");

        Ok(LocalFileHandle {
            path,
            media_kind: kind,
            size_bytes: bytes.len() as u64,
        })
    }
}

fn extension_from_url(url: &Url) -> Option<String> {
    let last = url.path_segments()?.next_back()?;
    let ext = Path::new(last).extension()?.to_str()?;
    if ext.is_empty() || ext.len() > 5 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Download request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Download returned HTTP {status}")]
    HttpStatus { status: u16 },

    #[error("Download returned no data")]
    NoData,

    #[error("Failed to write result file: {0}")]
    WriteFailed(#[source] std::io::Error),

    #[error("Download cancelled")]
    Cancelled,
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Transport(_) | FetchError::HttpStatus { .. } => ErrorKind::Transport,
            FetchError::NoData => ErrorKind::MalformedResponse,
            FetchError::WriteFailed(_) => ErrorKind::LocalIo,
            FetchError::Cancelled => ErrorKind::Cancelled,
        }
    }
}
