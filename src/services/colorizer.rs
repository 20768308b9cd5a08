//! End-to-end colorization: submit, wait for the result, store it locally and
//! record it in the history.

use std::sync::Arc;
use std::time::Instant;

use reqwest::Url;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::{ColorizerConfig, ConfigError, Endpoints};
use crate::error::ColorizeError;
use crate::models::history::HistoryEntry;
use crate::models::job::{JobProgress, JobResult, LocalFileHandle, SubmitResponse, TaskHandle, UploadJob};
use crate::models::media::MediaKind;
use crate::services::fetcher::ResultFetcher;
use crate::services::history::HistoryStore;
use crate::services::poller::{HttpStatusSource, JobPoller, PollSettings};
use crate::services::thumbnail;
use crate::services::uploader::MediaUploader;

/// Result of a successful colorization.
#[derive(Debug, Clone)]
pub struct ColorizeOutcome {
    pub file: LocalFileHandle,
    /// Present when the backend processed the job asynchronously.
    pub task: Option<TaskHandle>,
    /// Id of the history entry, if recording it succeeded.
    pub history_entry: Option<Uuid>,
}

pub struct Colorizer {
    endpoints: Endpoints,
    uploader: MediaUploader,
    poller: JobPoller<HttpStatusSource>,
    fetcher: ResultFetcher,
    history: Arc<HistoryStore>,
    progress: watch::Sender<JobProgress>,
}

impl Colorizer {
    pub fn new(config: &ColorizerConfig, history: Arc<HistoryStore>) -> Result<Self, ConfigError> {
        let endpoints = config.endpoints()?;
        let uploader = MediaUploader::new(config)?;
        let poller = JobPoller::new(
            HttpStatusSource::new(endpoints.clone())?,
            PollSettings::from(config),
        );
        let fetcher = ResultFetcher::new(config)?;
        let (progress, _) = watch::channel(JobProgress::Idle);

        Ok(Self {
            endpoints,
            uploader,
            poller,
            fetcher,
            history,
            progress,
        })
    }

    /// Replace the result fetcher, e.g. to store results somewhere other than
    /// the system temp directory.
    pub fn with_fetcher(mut self, fetcher: ResultFetcher) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    /// Observe the stage of the job in flight.
    pub fn subscribe(&self) -> watch::Receiver<JobProgress> {
        self.progress.subscribe()
    }

    /// Build a job targeting the route for `kind`.
    pub fn job(&self, media_bytes: Vec<u8>, media_kind: MediaKind) -> UploadJob {
        UploadJob::new(media_bytes, media_kind, self.endpoints.for_kind(media_kind))
    }

    /// Colorize `job` and record it in the history.
    ///
    /// `thumbnail` is only used for videos; image thumbnails are derived from
    /// the result itself. Failing to record history is logged but does not
    /// fail the job.
    pub async fn run(
        &self,
        job: UploadJob,
        thumbnail: Option<Vec<u8>>,
        cancel: &CancellationToken,
    ) -> Result<ColorizeOutcome, ColorizeError> {
        let kind = job.media_kind;
        let started = Instant::now();
        metrics::counter!("colorize_jobs_submitted_total", "kind" => kind.label()).increment(1);

        let result = self.execute(&job, cancel).await;
        let (file, task) = match result {
            Ok(done) => {
                metrics::counter!("colorize_jobs_completed_total", "kind" => kind.label()).increment(1);
                metrics::histogram!("colorize_job_seconds", "kind" => kind.label())
                    .record(started.elapsed().as_secs_f64());
                self.progress.send_replace(JobProgress::Finished);
                done
            }
            Err(e) => {
                let error_kind: &'static str = e.kind().into();
                metrics::counter!(
                    "colorize_jobs_failed_total",
                    "kind" => kind.label(),
                    "error" => error_kind
                )
                .increment(1);
                tracing::error!(kind = %kind, error = %e, error_kind, "Colorization failed");
                self.progress.send_replace(JobProgress::Idle);
                return Err(e);
            }
        };

        tracing::info!(
            kind = %kind,
            path = %file.path.display(),
            bytes = file.size_bytes,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Colorization complete"
        );

        let history_entry = self.record_history(&file, thumbnail).await;

        Ok(ColorizeOutcome {
            file,
            task,
            history_entry,
        })
    }

    /// Like [`Colorizer::run`], collapsed into a presentation-friendly summary.
    pub async fn run_job(
        &self,
        job: UploadJob,
        thumbnail: Option<Vec<u8>>,
        cancel: &CancellationToken,
    ) -> JobResult {
        match self.run(job, thumbnail, cancel).await {
            Ok(outcome) => JobResult::Success { file: outcome.file },
            Err(e) => JobResult::Failure {
                kind: e.kind(),
                message: e.to_string(),
            },
        }
    }

    async fn execute(
        &self,
        job: &UploadJob,
        cancel: &CancellationToken,
    ) -> Result<(LocalFileHandle, Option<TaskHandle>), ColorizeError> {
        let kind = job.media_kind;
        self.progress.send_replace(JobProgress::Uploading { kind });

        match self.uploader.submit(job, cancel).await? {
            SubmitResponse::RawMedia { bytes, .. } => {
                tracing::debug!(bytes = bytes.len(), "Backend returned the result inline");
                let file = self.fetcher.store(&bytes, kind).await?;
                Ok((file, None))
            }
            SubmitResponse::DirectResult { output_url } => {
                tracing::debug!(output_url = %output_url, "Backend returned a direct result");
                let file = self.download(&output_url, kind, cancel).await?;
                Ok((file, None))
            }
            SubmitResponse::TaskAccepted { task_id } => {
                tracing::info!(task_id = %task_id, "Backend accepted task, polling for status");
                let mut handle = TaskHandle::new(task_id);
                self.progress.send_replace(JobProgress::Processing {
                    attempt: 0,
                    fraction: None,
                });
                let output_url = self
                    .poller
                    .poll(&mut handle, cancel, Some(&self.progress))
                    .await?;
                let file = self.download(&output_url, kind, cancel).await?;
                Ok((file, Some(handle)))
            }
        }
    }

    async fn download(
        &self,
        output_url: &str,
        kind: MediaKind,
        cancel: &CancellationToken,
    ) -> Result<LocalFileHandle, ColorizeError> {
        let url = self.endpoints.resolve(output_url)?;
        self.progress.send_replace(JobProgress::Downloading);
        Ok(self.fetcher.download(url, kind, cancel).await?)
    }

    async fn record_history(&self, file: &LocalFileHandle, thumbnail: Option<Vec<u8>>) -> Option<Uuid> {
        let entry = match file.media_kind {
            MediaKind::Image => {
                let thumb = match tokio::fs::read(&file.path).await {
                    Ok(bytes) => bounded_thumbnail(&bytes),
                    Err(e) => {
                        tracing::warn!(path = %file.path.display(), error = %e, "Could not read result for thumbnail");
                        None
                    }
                };
                HistoryEntry::image(thumb)
            }
            MediaKind::Video => {
                let thumb = thumbnail.as_deref().and_then(bounded_thumbnail);
                let reference = Url::from_file_path(&file.path)
                    .map(|u| u.to_string())
                    .unwrap_or_else(|_| file.path.display().to_string());
                HistoryEntry::video(Some(reference), thumb)
            }
        };

        let id = entry.id;
        match self.history.append(entry).await {
            Ok(()) => Some(id),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to record colorization in history");
                None
            }
        }
    }
}

fn bounded_thumbnail(bytes: &[u8]) -> Option<Vec<u8>> {
    thumbnail::make_thumbnail(bytes)
        .inspect_err(|e| tracing::warn!(error = %e, "Could not build thumbnail"))
        .ok()
}
