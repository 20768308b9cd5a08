use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;

use crate::error::ErrorKind;
use crate::models::media::MediaKind;

#[derive(Debug, Clone, Deserialize)]
pub struct ColorizerConfig {
    /// Base URL of the colorization backend (e.g., "http://192.168.1.20:3000").
    /// Only checked when a job is submitted.
    #[serde(default)]
    pub backend_url: String,

    /// Directory holding persisted client state (history). Defaults to the
    /// platform data directory.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Delay between two status polls of an asynchronous task
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Maximum number of status polls before a task is reported as timed out
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,

    /// Idle timeout for video uploads
    #[serde(default = "default_video_request_timeout_secs")]
    pub video_request_timeout_secs: u64,

    /// Total transfer timeout for video uploads
    #[serde(default = "default_video_resource_timeout_secs")]
    pub video_resource_timeout_secs: u64,

    /// Total timeout for result downloads
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
}

fn default_poll_interval_ms() -> u64 {
    5_000
}

fn default_max_poll_attempts() -> u32 {
    120
}

fn default_video_request_timeout_secs() -> u64 {
    300
}

fn default_video_resource_timeout_secs() -> u64 {
    3_600
}

fn default_download_timeout_secs() -> u64 {
    300
}

impl ColorizerConfig {
    /// Config for `backend_url` with every other setting at its default.
    pub fn new(backend_url: impl Into<String>) -> Self {
        Self {
            backend_url: backend_url.into(),
            data_dir: None,
            poll_interval_ms: default_poll_interval_ms(),
            max_poll_attempts: default_max_poll_attempts(),
            video_request_timeout_secs: default_video_request_timeout_secs(),
            video_resource_timeout_secs: default_video_resource_timeout_secs(),
            download_timeout_secs: default_download_timeout_secs(),
        }
    }

    /// Load from `COLORIZER_*` environment variables (and `.env` if present).
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::prefixed("COLORIZER_").from_env()
    }

    pub fn endpoints(&self) -> Result<Endpoints, ConfigError> {
        Endpoints::parse(&self.backend_url)
    }

    pub fn data_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::data_dir()
                .map(|dir| dir.join("colorizer"))
                .ok_or(ConfigError::NoDataDir),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn video_request_timeout(&self) -> Duration {
        Duration::from_secs(self.video_request_timeout_secs)
    }

    pub fn video_resource_timeout(&self) -> Duration {
        Duration::from_secs(self.video_resource_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

/// Validated backend base URL and the routes hanging off it.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoints {
    base: Url,
}

impl Endpoints {
    pub fn parse(base: &str) -> Result<Self, ConfigError> {
        let trimmed = base.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::MissingBackendUrl);
        }

        let mut url = Url::parse(trimmed).map_err(|e| ConfigError::InvalidBackendUrl {
            url: trimmed.to_string(),
            reason: e.to_string(),
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidBackendUrl {
                url: trimmed.to_string(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }

        // Url::join replaces the last path segment unless the path ends in '/'.
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        url.set_query(None);
        url.set_fragment(None);

        Ok(Self { base: url })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// POST target for synchronous image colorization.
    pub fn colorize(&self) -> Url {
        self.route(&["colorize"])
    }

    /// POST target for video colorization.
    pub fn colorize_video(&self) -> Url {
        self.route(&["colorize-video"])
    }

    pub fn for_kind(&self, kind: MediaKind) -> Url {
        match kind {
            MediaKind::Image => self.colorize(),
            MediaKind::Video => self.colorize_video(),
        }
    }

    /// GET target for the status of `task_id`.
    pub fn status(&self, task_id: &str) -> Url {
        self.route(&["status", task_id])
    }

    /// Resolve an output reference returned by the backend. Absolute URLs are
    /// used as-is, anything else is relative to the backend base.
    pub fn resolve(&self, output_url: &str) -> Result<Url, ConfigError> {
        match Url::parse(output_url) {
            Ok(url) => Ok(url),
            Err(_) => self
                .base
                .join(output_url)
                .map_err(|e| ConfigError::InvalidOutputUrl {
                    url: output_url.to_string(),
                    reason: e.to_string(),
                }),
        }
    }

    fn route(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Backend URL is not configured")]
    MissingBackendUrl,

    #[error("Invalid backend URL '{url}': {reason}")]
    InvalidBackendUrl { url: String, reason: String },

    #[error("Invalid output URL '{url}': {reason}")]
    InvalidOutputUrl { url: String, reason: String },

    #[error("No platform data directory available; set COLORIZER_DATA_DIR")]
    NoDataDir,

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConfigError::InvalidOutputUrl { .. } => ErrorKind::MalformedResponse,
            _ => ErrorKind::InvalidConfiguration,
        }
    }
}
