//! Decides which requested URLs still need work by looking at the archive and
//! meta directories. Nothing is cached between runs; the tree is rescanned.

use anyhow::Result;
use std::collections::HashSet;
use std::path::Path;

use crate::error::{FatalError, ItemError};
use crate::layout::{Paths, has_video_prefix, list_file_names, metadata_file_name};
use crate::url::{UrlKind, classify};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub num_videos: usize,
    pub num_channels: usize,
    pub finished_videos: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Inspection {
    pub progress: Progress,
    pub finished: Vec<String>,
    pub pending: Vec<String>,
}

/// Returns every file in `names` that belongs to `video_id`.
pub fn matching_files<'a>(names: &'a [String], video_id: &str) -> Vec<&'a str> {
    names
        .iter()
        .map(String::as_str)
        .filter(|name| has_video_prefix(name, video_id))
        .collect()
}

/// Looks up the single archived media file of `video_id`. More than one match
/// is never resolved silently.
pub fn find_archived(archive_dir: &Path, video_id: &str) -> Result<Option<String>, ItemError> {
    let names = list_file_names(archive_dir)?;
    Ok(resolve_single(&names, video_id)?)
}

fn resolve_single(names: &[String], video_id: &str) -> Result<Option<String>, FatalError> {
    match matching_files(names, video_id).as_slice() {
        [] => Ok(None),
        [single] => Ok(Some((*single).to_owned())),
        many => Err(FatalError::MultipleVideoFound {
            video_id: video_id.to_owned(),
            files: many.iter().map(|name| (*name).to_owned()).collect(),
        }),
    }
}

/// Splits `urls` into finished and pending and counts what was requested.
///
/// Invalid lines are not counted but stay pending so the orchestrator can
/// report them. Channels are always pending. Duplicate lines collapse onto the
/// first occurrence.
pub fn inspect(paths: &Paths, urls: &[String]) -> Result<Inspection> {
    let archived = list_file_names(&paths.archive)?;
    let metadata: HashSet<String> = list_file_names(&paths.meta)?.into_iter().collect();
    let mut seen = HashSet::new();
    let mut inspection = Inspection::default();

    for url in urls {
        let url = url.trim();
        if url.is_empty() || !seen.insert(url.to_owned()) {
            continue;
        }

        match classify(url) {
            UrlKind::Video(video_id) => {
                inspection.progress.num_videos += 1;
                let has_metadata = metadata.contains(&metadata_file_name(&video_id));
                if has_metadata && matching_files(&archived, &video_id).len() == 1 {
                    inspection.progress.finished_videos += 1;
                    inspection.finished.push(url.to_owned());
                } else {
                    inspection.pending.push(url.to_owned());
                }
            }
            UrlKind::Channel(_) => {
                inspection.progress.num_channels += 1;
                inspection.pending.push(url.to_owned());
            }
            UrlKind::Invalid => inspection.pending.push(url.to_owned()),
        }
    }

    Ok(inspection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn urls(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    fn prepared() -> Result<(tempfile::TempDir, Paths)> {
        let dir = tempdir()?;
        let paths = Paths::new(dir.path());
        paths.prepare()?;
        Ok((dir, paths))
    }

    #[test]
    fn archived_video_with_metadata_is_finished() -> Result<()> {
        let (_dir, paths) = prepared()?;
        fs::write(paths.archive.join("abc123.mp4"), "video")?;
        fs::write(paths.metadata_file("abc123"), "{}")?;

        let inspection = inspect(
            &paths,
            &urls(&["https://www.youtube.com/watch?v=abc123"]),
        )?;
        assert_eq!(inspection.finished.len(), 1);
        assert!(inspection.pending.is_empty());
        assert_eq!(
            inspection.progress,
            Progress {
                num_videos: 1,
                num_channels: 0,
                finished_videos: 1,
            }
        );
        Ok(())
    }

    #[test]
    fn missing_metadata_or_media_stays_pending() -> Result<()> {
        let (_dir, paths) = prepared()?;
        fs::write(paths.archive.join("nometa.mp4"), "video")?;
        fs::write(paths.metadata_file("nomedia"), "{}")?;

        let inspection = inspect(
            &paths,
            &urls(&[
                "https://www.youtube.com/watch?v=nometa",
                "https://www.youtube.com/watch?v=nomedia",
            ]),
        )?;
        assert_eq!(inspection.pending.len(), 2);
        assert_eq!(inspection.progress.finished_videos, 0);
        Ok(())
    }

    #[test]
    fn ambiguous_archive_is_not_finished() -> Result<()> {
        let (_dir, paths) = prepared()?;
        fs::write(paths.archive.join("dup.mp4"), "a")?;
        fs::write(paths.archive.join("dup.webm"), "b")?;
        fs::write(paths.metadata_file("dup"), "{}")?;

        let inspection = inspect(&paths, &urls(&["https://www.youtube.com/watch?v=dup"]))?;
        assert_eq!(inspection.pending.len(), 1);

        let err = find_archived(&paths.archive, "dup").unwrap_err();
        assert!(matches!(
            err,
            ItemError::Fatal(FatalError::MultipleVideoFound { .. })
        ));
        Ok(())
    }

    #[test]
    fn channels_and_invalid_lines_are_pending() -> Result<()> {
        let (_dir, paths) = prepared()?;
        let inspection = inspect(
            &paths,
            &urls(&[
                "https://www.youtube.com/channel/UCabc",
                "https://example.com/not-a-video",
                "",
                "https://www.youtube.com/channel/UCabc",
            ]),
        )?;
        assert_eq!(
            inspection.pending,
            urls(&[
                "https://www.youtube.com/channel/UCabc",
                "https://example.com/not-a-video",
            ])
        );
        assert_eq!(inspection.progress.num_channels, 1);
        assert_eq!(inspection.progress.num_videos, 0);
        Ok(())
    }

    #[test]
    fn find_archived_returns_single_match() -> Result<()> {
        let (_dir, paths) = prepared()?;
        fs::write(paths.archive.join("abc.mkv"), "a")?;
        fs::write(paths.archive.join("abcd.mp4"), "b")?;
        assert_eq!(
            find_archived(&paths.archive, "abc")?,
            Some("abc.mkv".to_string())
        );
        assert_eq!(find_archived(&paths.archive, "zzz")?, None);
        Ok(())
    }
}
