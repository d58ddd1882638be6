//! `list incomplete`: finds archived media that is noticeably shorter than the
//! duration its metadata declares, using ffprobe to measure it.

use anyhow::{Context, Result};
use std::ffi::OsStr;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::layout::{Paths, is_partial_name};
use crate::metadata::VideoMetadata;

/// Media shorter than declared by more than this many seconds is incomplete.
pub const SHORTFALL_THRESHOLD_SECS: f64 = 5.0;

/// Ids of archived videos whose media is truncated or unreadable, sorted.
///
/// Files without metadata, or whose metadata declares no duration, are not
/// judged.
pub async fn list_incomplete(paths: &Paths, ffprobe: &OsStr) -> Result<Vec<String>> {
    let mut incomplete = Vec::new();
    if !paths.archive.is_dir() {
        return Ok(incomplete);
    }

    for entry in WalkDir::new(&paths.archive)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.with_context(|| format!("reading {}", paths.archive.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if is_partial_name(&name) {
            continue;
        }
        let Some((video_id, _)) = name.split_once('.') else {
            continue;
        };

        let metadata_path = paths.metadata_file(video_id);
        if !metadata_path.exists() {
            debug!(video_id, "no metadata, skipping");
            continue;
        }
        let declared = match VideoMetadata::load(&metadata_path) {
            Ok(metadata) => metadata.duration,
            Err(err) => {
                warn!(video_id, "{err}");
                continue;
            }
        };
        let Some(declared) = declared else {
            continue;
        };

        let measured = measure_duration(ffprobe, entry.path()).await;
        if is_incomplete(declared, measured) {
            incomplete.push(video_id.to_owned());
        }
    }

    Ok(incomplete)
}

fn is_incomplete(declared: f64, measured: Option<f64>) -> bool {
    match measured {
        Some(measured) => declared - measured > SHORTFALL_THRESHOLD_SECS,
        None => true,
    }
}

/// Container duration in seconds as reported by ffprobe. `None` when ffprobe
/// fails or prints nothing usable.
async fn measure_duration(ffprobe: &OsStr, media: &Path) -> Option<f64> {
    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(media)
        .output()
        .await;

    match output {
        Ok(output) if output.status.success() => {
            let parsed = parse_duration(&String::from_utf8_lossy(&output.stdout));
            if parsed.is_none() {
                warn!(file = %media.display(), "ffprobe reported no duration");
            }
            parsed
        }
        Ok(output) => {
            warn!(
                file = %media.display(),
                status = %output.status,
                "ffprobe failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
            None
        }
        Err(err) => {
            warn!(file = %media.display(), %err, "could not run ffprobe");
            None
        }
    }
}

fn parse_duration(stdout: &str) -> Option<f64> {
    stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())?
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}
