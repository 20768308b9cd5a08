use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use crate::error::ErrorKind;
use crate::models::job::LocalFileHandle;

/// Destination for finished results (a photo library, a folder...).
#[async_trait]
pub trait GalleryWriter: Send + Sync {
    /// Save `file` and return where it ended up.
    async fn save(&self, file: &LocalFileHandle) -> Result<PathBuf, GalleryError>;
}

/// Copies results into a directory under timestamped names.
pub struct DirectoryGallery {
    dir: PathBuf,
}

impl DirectoryGallery {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn target_for(&self, file: &LocalFileHandle, attempt: u32) -> PathBuf {
        let stamp = Utc::now().format("%Y%m%d-%H%M%S");
        let kind = file.media_kind.label();
        let ext = file
            .path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_else(|| file.media_kind.default_extension());
        let name = if attempt == 0 {
            format!("colorized-{kind}-{stamp}.{ext}")
        } else {
            format!("colorized-{kind}-{stamp}-{attempt}.{ext}")
        };
        self.dir.join(name)
    }
}

#[async_trait]
impl GalleryWriter for DirectoryGallery {
    async fn save(&self, file: &LocalFileHandle) -> Result<PathBuf, GalleryError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| GalleryError::Io {
                path: self.dir.clone(),
                source,
            })?;

        let mut input = tokio::fs::File::open(&file.path)
            .await
            .map_err(|source| GalleryError::Io {
                path: file.path.clone(),
                source,
            })?;

        // Claim the name with create_new so concurrent saves never share a target.
        let mut attempt = 0;
        let (target, mut dest) = loop {
            let candidate = self.target_for(file, attempt);
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
                .await
            {
                Ok(dest) => break (candidate, dest),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
                Err(source) => {
                    return Err(GalleryError::Io {
                        path: candidate,
                        source,
                    })
                }
            }
        };

        let copied = async {
            tokio::io::copy(&mut input, &mut dest).await?;
            dest.flush().await
        }
        .await;
        if let Err(source) = copied {
            let _ = tokio::fs::remove_file(&target).await;
            return Err(GalleryError::Io {
                path: target,
                source,
            });
        }

        tracing::info!(path = %target.display(), kind = %file.media_kind, "Saved result to gallery");
        Ok(target)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GalleryError {
    #[error("Failed to save to gallery at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl GalleryError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::LocalIo
    }
}
