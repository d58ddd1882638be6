//! Brings one requested URL into the archive.
//!
//! Videos already present in `archive/` are reused without touching the
//! network. Everything else is downloaded into `temporary/<id>/`, moved into
//! `archive/` and `meta/`, and linked into both views. The scratch directory
//! is removed afterwards whatever happened.

use anyhow::{Context, anyhow};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::downloader::{self, DownloadRequest, DownloaderConfig, SignalTrap};
use crate::error::{FatalError, ItemError};
use crate::inspect::find_archived;
use crate::layout::{
    Paths, has_video_prefix, is_metadata_name, is_partial_name, list_file_names,
    metadata_file_name, video_id_from_metadata_name,
};
use crate::ledger;
use crate::links::{LinkReport, build_links};
use crate::metadata::VideoMetadata;
use crate::url::{UrlKind, classify};

/// Successful end states of a single item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Downloaded during this run.
    Archived { video_id: String },
    /// Already in `archive/`; only links were refreshed.
    Reused { video_id: String },
    /// The service refused the video; recorded in the ledger.
    Rejected { video_id: String, reason: String },
    /// yt-dlp skipped it because the ledger already lists it.
    Skipped { video_id: String },
    Channel {
        channel_id: String,
        archived: usize,
        rejected: usize,
    },
}

/// Tagged outcome the batch loop branches on.
#[derive(Debug)]
pub enum ItemOutcome {
    Success(Completion),
    Recoverable(anyhow::Error),
    Fatal(FatalError),
}

impl From<Result<Completion, ItemError>> for ItemOutcome {
    fn from(result: Result<Completion, ItemError>) -> Self {
        match result {
            Ok(completion) => ItemOutcome::Success(completion),
            Err(ItemError::Fatal(err)) => ItemOutcome::Fatal(err),
            Err(ItemError::Recoverable(err)) => ItemOutcome::Recoverable(err),
        }
    }
}

pub struct Orchestrator {
    paths: Paths,
    downloader: DownloaderConfig,
    signals: SignalTrap,
}

impl Orchestrator {
    pub fn new(paths: Paths, downloader: DownloaderConfig, signals: SignalTrap) -> Self {
        Self {
            paths,
            downloader,
            signals,
        }
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    pub async fn process(&mut self, url: &str) -> ItemOutcome {
        self.try_process(url).await.into()
    }

    async fn try_process(&mut self, url: &str) -> Result<Completion, ItemError> {
        match classify(url) {
            UrlKind::Invalid => Err(FatalError::InvalidUrl(url.to_owned()).into()),
            UrlKind::Video(video_id) => self.process_video(url, &video_id).await,
            UrlKind::Channel(channel_id) => self.process_channel(url, &channel_id).await,
        }
    }

    async fn process_video(&mut self, url: &str, video_id: &str) -> Result<Completion, ItemError> {
        if let Some(existing) = find_archived(&self.paths.archive, video_id)? {
            info!(video_id, file = %existing, "already archived, skipping download");
            let media = self.paths.archive.join(existing);
            self.link(video_id, &media)?;
            return Ok(Completion::Reused {
                video_id: video_id.to_owned(),
            });
        }

        let scratch = self.fresh_scratch(video_id)?;
        let result = self.download_video(url, video_id, &scratch).await;
        remove_scratch(&scratch);
        result
    }

    async fn download_video(
        &mut self,
        url: &str,
        video_id: &str,
        scratch: &Path,
    ) -> Result<Completion, ItemError> {
        let request = DownloadRequest {
            url: url.to_owned(),
            ledger: self.paths.ledger.clone(),
            output_dir: scratch.to_path_buf(),
            channel: false,
        };
        let invocation = downloader::run(&self.downloader, &request, &mut self.signals).await?;

        if !invocation.status.success() {
            if let Some(rejection) = downloader::rejections(&invocation.stderr).into_iter().next() {
                ledger::record_rejection(&self.paths.ledger, video_id, &rejection.reason)?;
                warn!(video_id, reason = %rejection.reason, "rejected by YouTube, recorded in ledger");
                return Ok(Completion::Rejected {
                    video_id: video_id.to_owned(),
                    reason: rejection.reason,
                });
            }
            return Err(ItemError::Recoverable(anyhow!(
                "downloader exited with {} for {video_id}",
                invocation.status
            )));
        }

        let names = list_file_names(scratch)?;
        match media_files(&names, video_id).as_slice() {
            [] => {
                if ledger::contains(&self.paths.ledger, video_id)? {
                    info!(video_id, "listed in ledger, downloader skipped it");
                    Ok(Completion::Skipped {
                        video_id: video_id.to_owned(),
                    })
                } else {
                    Err(ItemError::Recoverable(anyhow!(
                        "downloader produced no media for {video_id}"
                    )))
                }
            }
            [media] => {
                let archived = self.relocate(scratch, video_id, media)?;
                self.link(video_id, &archived)?;
                Ok(Completion::Archived {
                    video_id: video_id.to_owned(),
                })
            }
            many => Err(multiple_found(video_id, many).into()),
        }
    }

    async fn process_channel(
        &mut self,
        url: &str,
        channel_id: &str,
    ) -> Result<Completion, ItemError> {
        let scratch = self.fresh_scratch(channel_id)?;
        let result = self.download_channel(url, channel_id, &scratch).await;
        remove_scratch(&scratch);
        result
    }

    async fn download_channel(
        &mut self,
        url: &str,
        channel_id: &str,
        scratch: &Path,
    ) -> Result<Completion, ItemError> {
        let request = DownloadRequest {
            url: url.to_owned(),
            ledger: self.paths.ledger.clone(),
            output_dir: scratch.to_path_buf(),
            channel: true,
        };
        let invocation = downloader::run(&self.downloader, &request, &mut self.signals).await?;
        let archived = self.collect_channel_scratch(scratch)?;
        info!(channel_id, archived, "channel download finished");

        if invocation.status.success() {
            return Ok(Completion::Channel {
                channel_id: channel_id.to_owned(),
                archived,
                rejected: 0,
            });
        }

        let rejected: Vec<(String, String)> = downloader::rejections(&invocation.stderr)
            .into_iter()
            .filter_map(|rejection| Some((rejection.video_id?, rejection.reason)))
            .collect();
        let mut recorded = HashSet::new();
        for (video_id, reason) in &rejected {
            if recorded.insert(video_id.as_str()) {
                ledger::record_rejection(&self.paths.ledger, video_id, reason)?;
                warn!(channel_id, video_id = %video_id, reason = %reason, "rejected by YouTube, recorded in ledger");
            }
        }

        let errors = downloader::error_count(&invocation.stderr);
        if errors > 0 && rejected.len() == errors {
            return Ok(Completion::Channel {
                channel_id: channel_id.to_owned(),
                archived,
                rejected: recorded.len(),
            });
        }
        Err(ItemError::Recoverable(anyhow!(
            "downloader exited with {} for channel {channel_id}",
            invocation.status
        )))
    }

    /// Moves every completed `<id>.info.json` + media pair out of a channel
    /// scratch directory. Metadata without media is left behind.
    fn collect_channel_scratch(&self, scratch: &Path) -> Result<usize, ItemError> {
        let names = list_file_names(scratch)?;
        let mut archived = 0;
        for name in &names {
            let Some(video_id) = video_id_from_metadata_name(name) else {
                continue;
            };
            let archived_media = match media_files(&names, video_id).as_slice() {
                [] => continue,
                [media] => match find_archived(&self.paths.archive, video_id)? {
                    Some(existing) => {
                        self.move_metadata(scratch, video_id)?;
                        self.paths.archive.join(existing)
                    }
                    None => self.relocate(scratch, video_id, media)?,
                },
                many => return Err(multiple_found(video_id, many).into()),
            };
            self.link(video_id, &archived_media)?;
            archived += 1;
        }
        Ok(archived)
    }

    /// Moves metadata into `meta/` and media into `archive/`, returning the
    /// archived media path.
    fn relocate(&self, scratch: &Path, video_id: &str, media: &str) -> Result<PathBuf, ItemError> {
        self.move_metadata(scratch, video_id)?;
        let target = self.paths.archive.join(media);
        let source = scratch.join(media);
        fs::rename(&source, &target)
            .with_context(|| format!("moving {} to {}", source.display(), target.display()))?;
        info!(video_id, file = %target.display(), "archived");
        Ok(target)
    }

    fn move_metadata(&self, scratch: &Path, video_id: &str) -> Result<(), ItemError> {
        let source = scratch.join(metadata_file_name(video_id));
        if !source.exists() {
            return Ok(());
        }
        let target = self.paths.metadata_file(video_id);
        fs::rename(&source, &target)
            .with_context(|| format!("moving {} to {}", source.display(), target.display()))?;
        Ok(())
    }

    fn link(&self, video_id: &str, media: &Path) -> Result<LinkReport, ItemError> {
        let metadata = VideoMetadata::load(&self.paths.metadata_file(video_id))?;
        Ok(build_links(&self.paths, media, video_id, &metadata)?)
    }

    fn fresh_scratch(&self, item_id: &str) -> Result<PathBuf, ItemError> {
        let scratch = self.paths.scratch_dir(item_id);
        if scratch.exists() {
            fs::remove_dir_all(&scratch)
                .with_context(|| format!("clearing {}", scratch.display()))?;
        }
        fs::create_dir_all(&scratch).with_context(|| format!("creating {}", scratch.display()))?;
        Ok(scratch)
    }
}

fn remove_scratch(scratch: &Path) {
    if let Err(err) = fs::remove_dir_all(scratch) {
        warn!(path = %scratch.display(), %err, "could not remove scratch directory");
    }
}

/// Finished media files for `video_id` among `names`.
fn media_files<'a>(names: &'a [String], video_id: &str) -> Vec<&'a str> {
    names
        .iter()
        .map(String::as_str)
        .filter(|name| {
            has_video_prefix(name, video_id) && !is_metadata_name(name) && !is_partial_name(name)
        })
        .collect()
}

fn multiple_found(video_id: &str, files: &[&str]) -> FatalError {
    FatalError::MultipleVideoFound {
        video_id: video_id.to_owned(),
        files: files.iter().map(|name| (*name).to_owned()).collect(),
    }
}
