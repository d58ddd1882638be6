//! Directory layout below the destination root.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

const ARCHIVE_SUBDIR: &str = "archive";
const META_SUBDIR: &str = "meta";
const LINK_SUBDIR: &str = "link";
const TEMPORARY_SUBDIR: &str = "temporary";
const LEDGER_FILE: &str = "all.txt";
const INFO_JSON_SUFFIX: &str = ".info.json";

/// Convenience wrapper around every filesystem location the archiver touches.
#[derive(Debug, Clone)]
pub struct Paths {
    pub base: PathBuf,
    pub archive: PathBuf,
    pub meta: PathBuf,
    pub link: PathBuf,
    pub temporary: PathBuf,
    /// Ledger handed to the downloader. Usually `meta/all.txt`, but the
    /// relocation guard may point it elsewhere for the run.
    pub ledger: PathBuf,
}

impl Paths {
    pub fn new(destination: &Path) -> Self {
        let base = destination.to_path_buf();
        let meta = base.join(META_SUBDIR);
        Self {
            archive: base.join(ARCHIVE_SUBDIR),
            link: base.join(LINK_SUBDIR),
            temporary: base.join(TEMPORARY_SUBDIR),
            ledger: meta.join(LEDGER_FILE),
            meta,
            base,
        }
    }

    /// Canonical ledger location, independent of any relocation.
    pub fn canonical_ledger(&self) -> PathBuf {
        self.meta.join(LEDGER_FILE)
    }

    pub fn with_ledger(mut self, ledger: PathBuf) -> Self {
        self.ledger = ledger;
        self
    }

    /// Creates the four top-level directories so later steps can assume they
    /// exist.
    pub fn prepare(&self) -> Result<()> {
        for dir in [&self.archive, &self.meta, &self.link, &self.temporary] {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        Ok(())
    }

    pub fn metadata_file(&self, video_id: &str) -> PathBuf {
        self.meta.join(metadata_file_name(video_id))
    }

    pub fn by_channel(&self) -> PathBuf {
        self.link.join("byChannel")
    }

    pub fn by_date(&self) -> PathBuf {
        self.link.join("byDate")
    }

    pub fn scratch_dir(&self, item_id: &str) -> PathBuf {
        self.temporary.join(item_id)
    }
}

pub fn metadata_file_name(video_id: &str) -> String {
    format!("{video_id}{INFO_JSON_SUFFIX}")
}

/// Returns the video id of a `<id>.info.json` file name.
pub fn video_id_from_metadata_name(name: &str) -> Option<&str> {
    name.strip_suffix(INFO_JSON_SUFFIX)
        .filter(|id| !id.is_empty())
}

pub fn is_metadata_name(name: &str) -> bool {
    name.ends_with(INFO_JSON_SUFFIX)
}

/// Leftovers of an unfinished download.
pub fn is_partial_name(name: &str) -> bool {
    name.ends_with(".part") || name.ends_with(".ytdl") || name.contains(".part-Frag")
}

/// Media files are named `<id>.<ext>`; `<id>` alone or other ids sharing a
/// prefix do not match.
pub fn has_video_prefix(name: &str, video_id: &str) -> bool {
    name.strip_prefix(video_id)
        .is_some_and(|rest| rest.starts_with('.'))
}

/// Lists plain file names inside `dir`. A missing directory yields no names.
pub fn list_file_names(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    if !dir.exists() {
        return Ok(names);
    }
    for entry in fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        names.push(
            entry
                .file_name()
                .into_string()
                .unwrap_or_else(|os| os.to_string_lossy().into_owned()),
        );
    }
    names.sort();
    Ok(names)
}
