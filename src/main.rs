use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use colorizer_client::config::ColorizerConfig;
use colorizer_client::models::job::JobProgress;
use colorizer_client::models::media::MediaKind;
use colorizer_client::services::colorizer::Colorizer;
use colorizer_client::services::gallery::{DirectoryGallery, GalleryWriter};
use colorizer_client::services::history::HistoryStore;
use colorizer_client::services::kv::FileKeyValueStore;
use colorizer_client::telemetry;

/// Colorize images and videos with a remote colorization backend
#[derive(Parser, Debug)]
#[command(name = "colorizer", version, about)]
struct Cli {
    /// Backend base URL (overrides COLORIZER_BACKEND_URL)
    #[arg(long, global = true)]
    backend_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Colorize an image or video file
    Colorize {
        /// Media file to upload
        file: PathBuf,

        /// Media kind (image or video); guessed from the extension if omitted
        #[arg(short, long)]
        kind: Option<MediaKind>,

        /// Preview image stored in the history for videos
        #[arg(long)]
        thumbnail: Option<PathBuf>,

        /// Copy the result into this directory
        #[arg(long = "save-to")]
        save_to: Option<PathBuf>,
    },

    /// Inspect or edit the colorization history
    History {
        #[command(subcommand)]
        command: HistoryCommand,
    },
}

#[derive(Subcommand, Debug)]
enum HistoryCommand {
    /// List past colorizations, newest first
    List {
        /// Group entries by day
        #[arg(long)]
        by_day: bool,
    },

    /// Remove one entry
    Remove { id: Uuid },

    /// Remove every entry
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing();
    telemetry::describe_metrics();

    let cli = Cli::parse();

    let mut config =
        ColorizerConfig::from_env().context("Failed to load configuration from environment")?;
    if let Some(url) = cli.backend_url {
        config.backend_url = url;
    }

    let data_dir = config.data_dir()?;
    tracing::debug!(data_dir = %data_dir.display(), "Opening local state");
    let kv = FileKeyValueStore::new(data_dir)
        .await
        .context("Failed to open local state directory")?;
    let history = Arc::new(HistoryStore::new(Arc::new(kv)));

    match cli.command {
        Commands::Colorize {
            file,
            kind,
            thumbnail,
            save_to,
        } => colorize(&config, history, &file, kind, thumbnail.as_deref(), save_to).await,
        Commands::History { command } => run_history(&history, command).await,
    }
}

async fn colorize(
    config: &ColorizerConfig,
    history: Arc<HistoryStore>,
    file: &Path,
    kind: Option<MediaKind>,
    thumbnail: Option<&Path>,
    save_to: Option<PathBuf>,
) -> Result<()> {
    let kind = match kind.or_else(|| MediaKind::from_path(file)) {
        Some(kind) => kind,
        None => bail!(
            "Cannot tell whether {} is an image or a video; pass --kind",
            file.display()
        ),
    };

    let media = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let thumbnail = match thumbnail {
        Some(path) => Some(
            tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read thumbnail {}", path.display()))?,
        ),
        None => None,
    };

    let colorizer = Colorizer::new(config, history)?;
    tracing::info!(backend = %colorizer.endpoints().base(), "Using colorization backend");

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling job");
            trigger.cancel();
        }
    });

    let mut progress = colorizer.subscribe();
    let reporter = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let stage = progress.borrow_and_update().clone();
            match stage {
                JobProgress::Uploading { kind } => eprintln!("Uploading {}...", kind.label()),
                JobProgress::Processing { attempt, fraction } => match fraction {
                    Some(f) => eprintln!("Processing ({:.0}%, check {attempt})", f * 100.0),
                    None if attempt > 0 => eprintln!("Processing (check {attempt})"),
                    None => eprintln!("Processing..."),
                },
                JobProgress::Downloading => eprintln!("Downloading result..."),
                JobProgress::Finished | JobProgress::Idle => {}
            }
        }
    });

    let job = colorizer.job(media, kind);
    let result = colorizer.run(job, thumbnail, &cancel).await;
    drop(colorizer);
    reporter.abort();

    let outcome = result?;
    println!("{}", outcome.file.path.display());

    if let Some(dir) = save_to {
        let saved = DirectoryGallery::new(dir).save(&outcome.file).await?;
        println!("{}", saved.display());
    }

    Ok(())
}

async fn run_history(history: &HistoryStore, command: HistoryCommand) -> Result<()> {
    match command {
        HistoryCommand::List { by_day: false } => {
            for entry in history.all().await {
                println!(
                    "{}  {}  {:<5}  {}",
                    entry.id,
                    entry.timestamp.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M"),
                    entry.media_kind,
                    entry.file_reference.as_deref().unwrap_or("-")
                );
            }
        }
        HistoryCommand::List { by_day: true } => {
            for group in history.grouped_by_day().await {
                println!("{} ({})", group.label, group.entries.len());
                for entry in group.entries {
                    println!(
                        "  {}  {}  {}",
                        entry.timestamp.with_timezone(&chrono::Local).format("%-I:%M %p"),
                        entry.media_kind,
                        entry.id
                    );
                }
            }
        }
        HistoryCommand::Remove { id } => {
            if !history.remove(id).await? {
                bail!("No history entry with id {id}");
            }
        }
        HistoryCommand::Clear => history.clear().await?,
    }
    Ok(())
}
