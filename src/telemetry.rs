use tracing_subscriber::EnvFilter;

/// Initialize structured JSON logging on stderr, filtered by `RUST_LOG`.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();
}

/// Register descriptions for the metrics emitted by the client.
///
/// Metrics go through the `metrics` facade; they are only collected when the
/// embedding application installs a recorder.
pub fn describe_metrics() {
    metrics::describe_counter!(
        "colorize_jobs_submitted_total",
        "Colorization jobs submitted to the backend"
    );
    metrics::describe_counter!(
        "colorize_jobs_completed_total",
        "Colorization jobs whose result was stored locally"
    );
    metrics::describe_counter!(
        "colorize_jobs_failed_total",
        "Colorization jobs that ended in an error"
    );
    metrics::describe_counter!(
        "colorize_poll_attempts",
        "Status requests issued while waiting for asynchronous tasks"
    );
    metrics::describe_histogram!(
        "colorize_job_seconds",
        metrics::Unit::Seconds,
        "Time from submission to a locally stored result"
    );
}
