//! Pass-based retry loop over the pending URLs, plus the `download` entry point
//! that wraps it with directory setup and ledger relocation.

use anyhow::Context;
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::archive_list::{ArchiveListGuard, FilesystemProbe};
use crate::downloader::{DownloaderConfig, SignalTrap};
use crate::error::FatalError;
use crate::inspect::inspect;
use crate::layout::Paths;
use crate::orchestrator::{Completion, ItemOutcome, Orchestrator};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub passes: usize,
    pub archived: usize,
    pub reused: usize,
    pub rejected: usize,
    pub skipped: usize,
    pub channels: usize,
    /// Videos already complete before the run started.
    pub already_finished: usize,
}

impl BatchReport {
    fn record(&mut self, completion: &Completion) {
        match completion {
            Completion::Archived { .. } => self.archived += 1,
            Completion::Reused { .. } => self.reused += 1,
            Completion::Rejected { .. } => self.rejected += 1,
            Completion::Skipped { .. } => self.skipped += 1,
            Completion::Channel {
                archived, rejected, ..
            } => {
                self.channels += 1;
                self.archived += archived;
                self.rejected += rejected;
            }
        }
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} pass(es): {} archived, {} reused, {} rejected, {} skipped, {} channel(s), {} already complete",
            self.passes,
            self.archived,
            self.reused,
            self.rejected,
            self.skipped,
            self.channels,
            self.already_finished
        )
    }
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    Fatal(#[from] FatalError),

    #[error("giving up after {passes} pass(es), still pending: {}", .remaining.join(", "))]
    PassLimit {
        passes: usize,
        remaining: Vec<String>,
    },

    #[error("{0:#}")]
    Setup(#[from] anyhow::Error),
}

impl BatchError {
    pub fn exit_code(&self) -> i32 {
        match self {
            BatchError::Fatal(err) => err.exit_code(),
            _ => 1,
        }
    }
}

/// Runs passes until one finishes without recoverable failures. A fatal
/// outcome stops immediately. `max_passes` of `None` never gives up.
pub async fn run_batch(
    orchestrator: &mut Orchestrator,
    urls: Vec<String>,
    max_passes: Option<usize>,
) -> Result<BatchReport, BatchError> {
    let mut report = BatchReport::default();
    let mut pending = urls;

    while !pending.is_empty() {
        if let Some(limit) = max_passes
            && report.passes >= limit
        {
            return Err(BatchError::PassLimit {
                passes: report.passes,
                remaining: pending,
            });
        }
        report.passes += 1;
        if report.passes > 1 {
            info!(pass = report.passes, remaining = pending.len(), "retrying");
        }

        let total = pending.len();
        let mut retry = Vec::new();
        for (index, url) in pending.into_iter().enumerate() {
            let position = index + 1;
            println!("[{position}/{total}] ({}%) {url}", position * 100 / total);
            match orchestrator.process(&url).await {
                ItemOutcome::Success(completion) => report.record(&completion),
                ItemOutcome::Recoverable(err) => {
                    warn!(%url, "will retry: {err:#}");
                    retry.push(url);
                }
                ItemOutcome::Fatal(err) => {
                    error!(%url, "{err}");
                    return Err(err.into());
                }
            }
        }
        pending = retry;
    }

    Ok(report)
}

/// Everything `download` needs besides the URL list.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub downloader: DownloaderConfig,
    pub max_passes: Option<usize>,
}

/// Full `download` command: prepares the tree, relocates the ledger when
/// needed, skips finished videos and drives the retry loop. The ledger is
/// merged back whatever the outcome.
pub async fn download(
    destination: &Path,
    urls: &[String],
    options: DownloadOptions,
    probe: &dyn FilesystemProbe,
) -> Result<BatchReport, BatchError> {
    let paths = Paths::new(destination);
    paths.prepare()?;

    let guard = ArchiveListGuard::acquire(&paths.canonical_ledger(), probe)?;
    let paths = paths.with_ledger(guard.path().to_path_buf());
    let result = download_with(paths, urls, options).await;
    let released = guard.release();

    match (result, released) {
        (Ok(report), Ok(())) => Ok(report),
        (Ok(_), Err(err)) => Err(BatchError::Setup(err)),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(release_err)) => {
            error!("could not restore ledger: {release_err:#}");
            Err(err)
        }
    }
}

async fn download_with(
    paths: Paths,
    urls: &[String],
    options: DownloadOptions,
) -> Result<BatchReport, BatchError> {
    let inspection = inspect(&paths, urls)?;
    let progress = inspection.progress;
    println!(
        "{} video(s), {} channel(s), {} video(s) already archived",
        progress.num_videos, progress.num_channels, progress.finished_videos
    );

    let signals = SignalTrap::install().context("installing signal handlers")?;
    let mut orchestrator = Orchestrator::new(paths, options.downloader, signals);
    let mut report = run_batch(&mut orchestrator, inspection.pending, options.max_passes).await?;
    report.already_finished = progress.finished_videos;
    Ok(report)
}
