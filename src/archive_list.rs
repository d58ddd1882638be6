//! Keeps the dedup ledger on a filesystem where yt-dlp can lock it.
//!
//! yt-dlp takes an advisory lock on `--download-archive`. Some network
//! filesystems reject that, so for the duration of a run the ledger is copied
//! into a local temporary directory and copied back afterwards.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Filesystem kinds known to reject yt-dlp's locking.
pub const UNSUPPORTED_FILESYSTEMS: [&str; 2] = ["smbfs", "nfs"];

pub trait FilesystemProbe {
    /// Whether advisory locks work for files under `path`.
    fn is_lockable(&self, path: &Path) -> bool;
}

/// Probe for the host platform. Only macOS is inspected; every other
/// platform reports lockable.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeProbe;

impl FilesystemProbe for NativeProbe {
    fn is_lockable(&self, path: &Path) -> bool {
        match filesystem_type(path) {
            Ok(Some(kind)) => is_supported_kind(&kind),
            Ok(None) => true,
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    "could not determine filesystem type, assuming it supports locking: {err:#}"
                );
                true
            }
        }
    }
}

pub fn is_supported_kind(kind: &str) -> bool {
    !UNSUPPORTED_FILESYSTEMS
        .iter()
        .any(|unsupported| kind.eq_ignore_ascii_case(unsupported))
}

#[cfg(target_os = "macos")]
fn filesystem_type(path: &Path) -> Result<Option<String>> {
    let stats = nix::sys::statfs::statfs(path)
        .with_context(|| format!("statfs {}", path.display()))?;
    Ok(Some(stats.filesystem_type_name().to_owned()))
}

#[cfg(not(target_os = "macos"))]
fn filesystem_type(_path: &Path) -> Result<Option<String>> {
    Ok(None)
}

/// Where the ledger lives for the current run.
#[derive(Debug)]
pub struct ArchiveListGuard {
    canonical: PathBuf,
    working: PathBuf,
    temp: Option<TempDir>,
}

impl ArchiveListGuard {
    /// Relocates `canonical` when its directory cannot be locked.
    pub fn acquire(canonical: &Path, probe: &dyn FilesystemProbe) -> Result<Self> {
        let dir = canonical.parent().unwrap_or_else(|| Path::new("."));
        if probe.is_lockable(dir) {
            return Ok(Self {
                canonical: canonical.to_path_buf(),
                working: canonical.to_path_buf(),
                temp: None,
            });
        }

        let temp = tempfile::Builder::new()
            .prefix("ytarchive-ledger-")
            .tempdir()
            .context("creating temporary ledger directory")?;
        let file_name = canonical
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("all.txt"));
        let working = temp.path().join(file_name);
        if canonical.exists() {
            fs::copy(canonical, &working).with_context(|| {
                format!("copying {} to {}", canonical.display(), working.display())
            })?;
        }
        tracing::info!(
            from = %canonical.display(),
            to = %working.display(),
            "ledger filesystem does not support locking, using a temporary copy"
        );

        Ok(Self {
            canonical: canonical.to_path_buf(),
            working,
            temp: Some(temp),
        })
    }

    /// Ledger path to hand to the downloader.
    pub fn path(&self) -> &Path {
        &self.working
    }

    pub fn is_relocated(&self) -> bool {
        self.temp.is_some()
    }

    /// Copies the working ledger back and removes the temporary directory.
    pub fn release(mut self) -> Result<()> {
        let Some(temp) = self.temp.take() else {
            return Ok(());
        };
        if self.working.exists() {
            fs::copy(&self.working, &self.canonical).with_context(|| {
                format!(
                    "copying {} back to {}",
                    self.working.display(),
                    self.canonical.display()
                )
            })?;
        }
        temp.close().context("removing temporary ledger directory")?;
        Ok(())
    }
}
