//! Human-browsable hardlink views of the archive.
//!
//! ```text
//! link/byChannel/<uploader>/<uploadDate>_<title>_<videoId><ext>
//! link/byDate/<year>/<month>/<day>_<uploader>_<title>_<videoId><ext>
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::FatalError;
use crate::layout::Paths;
use crate::metadata::VideoMetadata;

/// Longest single path component accepted by common filesystems, in bytes.
const MAX_COMPONENT_BYTES: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkStatus {
    Created(PathBuf),
    Existing(PathBuf),
}

impl LinkStatus {
    pub fn path(&self) -> &Path {
        match self {
            LinkStatus::Created(path) | LinkStatus::Existing(path) => path,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkReport {
    pub by_channel: LinkStatus,
    pub by_date: LinkStatus,
}

/// Replaces characters that are illegal in file names with full-width
/// lookalikes, drops control characters and trims surrounding whitespace.
pub fn sanitize(value: &str) -> String {
    let replaced: String = value
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '/' => '／',
            '\\' => '＼',
            ':' => '：',
            '*' => '＊',
            '?' => '？',
            '"' => '＂',
            '<' => '＜',
            '>' => '＞',
            '|' => '｜',
            other => other,
        })
        .collect();
    replaced.trim().to_owned()
}

/// Sanitized name usable as a directory on its own.
fn directory_component(value: &str) -> String {
    let mut name = sanitize(value);
    if name.is_empty() || name == "." || name == ".." {
        return "_".to_owned();
    }
    if name.len() > MAX_COMPONENT_BYTES {
        let mut cut = MAX_COMPONENT_BYTES;
        while !name.is_char_boundary(cut) {
            cut -= 1;
        }
        name.truncate(cut);
    }
    name
}

/// Links `media` into both views. Safe to call repeatedly.
pub fn build_links(
    paths: &Paths,
    media: &Path,
    video_id: &str,
    metadata: &VideoMetadata,
) -> Result<LinkReport, FatalError> {
    let date = metadata
        .upload_date_parts()
        .ok_or_else(|| FatalError::Metadata {
            path: paths.metadata_file(video_id),
            reason: format!("invalid upload_date {:?}", metadata.upload_date),
        })?;
    let ext = media
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    let uploader = directory_component(&metadata.uploader);
    let title = sanitize(&metadata.fulltitle);

    let channel_dir = paths.by_channel().join(&uploader);
    let by_channel = link_with_truncation(media, &channel_dir, &title, |title| {
        format!("{}_{title}_{video_id}{ext}", metadata.upload_date)
    })?;

    let date_dir = paths.by_date().join(&date.year).join(&date.month);
    let by_date = link_with_truncation(media, &date_dir, &title, |title| {
        format!("{}_{uploader}_{title}_{video_id}{ext}", date.day)
    })?;

    Ok(LinkReport {
        by_channel,
        by_date,
    })
}

/// Creates `dir/<name(title)>` as a hardlink to `media`, dropping trailing
/// title characters while the filesystem rejects the name as too long.
fn link_with_truncation(
    media: &Path,
    dir: &Path,
    title: &str,
    name: impl Fn(&str) -> String,
) -> Result<LinkStatus, FatalError> {
    fs::create_dir_all(dir).map_err(|source| FatalError::Link {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut title = title.to_owned();
    loop {
        let target = dir.join(name(&title));
        match fs::hard_link(media, &target) {
            Ok(()) => return Ok(LinkStatus::Created(target)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                return Ok(LinkStatus::Existing(target));
            }
            Err(err) if is_name_too_long(&err) && !title.is_empty() => {
                title.pop();
            }
            Err(source) => {
                return Err(FatalError::Link {
                    path: target,
                    source,
                });
            }
        }
    }
}

#[cfg(unix)]
fn is_name_too_long(err: &io::Error) -> bool {
    err.raw_os_error() == Some(nix::errno::Errno::ENAMETOOLONG as i32)
}

#[cfg(windows)]
fn is_name_too_long(err: &io::Error) -> bool {
    // ERROR_FILENAME_EXCED_RANGE
    err.raw_os_error() == Some(206)
}

#[cfg(not(any(unix, windows)))]
fn is_name_too_long(_err: &io::Error) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    fn metadata(title: &str) -> VideoMetadata {
        VideoMetadata {
            upload_date: "20240315".into(),
            fulltitle: title.into(),
            uploader: "Some/Channel".into(),
            duration: None,
        }
    }

    fn archived(paths: &Paths, name: &str) -> Result<PathBuf> {
        paths.prepare()?;
        let media = paths.archive.join(name);
        fs::write(&media, "video-bytes")?;
        Ok(media)
    }

    #[test]
    fn sanitize_replaces_reserved_characters() {
        assert_eq!(sanitize("  a/b\\c:d*e?f\"g<h>i|j \n"), "a／b＼c：d＊e？f＂g＜h＞i｜j");
        assert_eq!(sanitize("tab\there"), "tabhere");
        assert_ne!(sanitize("a/b"), sanitize("a\\b"));
    }

    #[test]
    fn directory_component_never_empty() {
        assert_eq!(directory_component("   "), "_");
        assert_eq!(directory_component(".."), "_");
        assert_eq!(directory_component(&"é".repeat(200)).len(), 254);
    }

    #[test]
    fn build_links_creates_both_views() -> Result<()> {
        let dir = tempdir()?;
        let paths = Paths::new(dir.path());
        let media = archived(&paths, "abc123.mp4")?;

        let report = build_links(&paths, &media, "abc123", &metadata("Hello: World"))?;
        let by_channel = paths
            .by_channel()
            .join("Some／Channel")
            .join("20240315_Hello： World_abc123.mp4");
        let by_date = paths
            .by_date()
            .join("2024")
            .join("03")
            .join("15_Some／Channel_Hello： World_abc123.mp4");
        assert_eq!(report.by_channel, LinkStatus::Created(by_channel.clone()));
        assert_eq!(report.by_date, LinkStatus::Created(by_date.clone()));
        assert_eq!(fs::read_to_string(by_channel)?, "video-bytes");
        assert_eq!(fs::read_to_string(by_date)?, "video-bytes");
        Ok(())
    }

    #[test]
    fn build_links_is_idempotent() -> Result<()> {
        let dir = tempdir()?;
        let paths = Paths::new(dir.path());
        let media = archived(&paths, "abc123.webm")?;
        let meta = metadata("Title");

        build_links(&paths, &media, "abc123", &meta)?;
        let second = build_links(&paths, &media, "abc123", &meta)?;
        assert!(matches!(second.by_channel, LinkStatus::Existing(_)));
        assert!(matches!(second.by_date, LinkStatus::Existing(_)));

        let channel_entries = fs::read_dir(paths.by_channel().join("Some／Channel"))?.count();
        let date_entries = fs::read_dir(paths.by_date().join("2024").join("03"))?.count();
        assert_eq!(channel_entries, 1);
        assert_eq!(date_entries, 1);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn long_titles_are_truncated_until_they_fit() -> Result<()> {
        let dir = tempdir()?;
        let paths = Paths::new(dir.path());
        let media = archived(&paths, "abc123.mp4")?;
        let meta = metadata(&"x".repeat(400));

        let report = build_links(&paths, &media, "abc123", &meta)?;
        for status in [&report.by_channel, &report.by_date] {
            let LinkStatus::Created(path) = status else {
                panic!("expected a new link, got {status:?}");
            };
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            assert!(name.len() <= MAX_COMPONENT_BYTES, "{name}");
            assert!(name.ends_with("_abc123.mp4"));
            assert!(path.exists());
        }

        let again = build_links(&paths, &media, "abc123", &meta)?;
        assert_eq!(again.by_channel.path(), report.by_channel.path());
        assert!(matches!(again.by_date, LinkStatus::Existing(_)));
        Ok(())
    }

    #[test]
    fn invalid_upload_date_is_fatal() -> Result<()> {
        let dir = tempdir()?;
        let paths = Paths::new(dir.path());
        let media = archived(&paths, "abc123.mp4")?;
        let meta = VideoMetadata {
            upload_date: "2024".into(),
            ..metadata("Title")
        };
        let err = build_links(&paths, &media, "abc123", &meta).unwrap_err();
        assert!(matches!(err, FatalError::Metadata { .. }));
        Ok(())
    }
}
