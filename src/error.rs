use strum::{Display, IntoStaticStr};

use crate::config::ConfigError;
use crate::services::fetcher::FetchError;
use crate::services::gallery::GalleryError;
use crate::services::history::HistoryError;
use crate::services::poller::PollError;
use crate::services::uploader::UploadError;

/// Coarse classification of every failure the client can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// Bad or missing backend URL
    InvalidConfiguration,
    /// Connectivity, timeouts and unexpected HTTP statuses
    Transport,
    /// A body the client could not interpret
    MalformedResponse,
    /// The backend explicitly reported a failure
    ServerReported,
    /// Polling exceeded its attempt cap
    Timeout,
    /// Temp-file, gallery or key-value write failures
    LocalIo,
    /// Persisted history could not be decoded
    StorageCorrupt,
    /// The caller cancelled the job
    Cancelled,
}

/// Any failure of an end-to-end colorization.
#[derive(Debug, thiserror::Error)]
pub enum ColorizeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Poll(#[from] PollError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error(transparent)]
    Gallery(#[from] GalleryError),
}

impl ColorizeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ColorizeError::Config(e) => e.kind(),
            ColorizeError::Upload(e) => e.kind(),
            ColorizeError::Poll(e) => e.kind(),
            ColorizeError::Fetch(e) => e.kind(),
            ColorizeError::History(e) => e.kind(),
            ColorizeError::Gallery(e) => e.kind(),
        }
    }
}
