//! The dedup ledger shared with yt-dlp (`--download-archive`).
//!
//! yt-dlp writes one `youtube <id>` line per finished download and skips any
//! id it finds in the file. Permanent rejections are appended in the same
//! format, preceded by a `#` comment carrying the timestamp and reason; yt-dlp
//! never matches those comment lines against a real id.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

const EXTRACTOR_KEY: &str = "youtube";

/// Parses the ledger into the set of recorded video ids.
pub fn load(path: &Path) -> Result<HashSet<String>> {
    if !path.exists() {
        return Ok(HashSet::new());
    }

    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let reader = BufReader::new(file);
    let mut entries = HashSet::new();

    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if let Some(id) = trimmed.split_whitespace().last() {
            entries.insert(id.to_owned());
        }
    }

    Ok(entries)
}

pub fn contains(path: &Path, video_id: &str) -> Result<bool> {
    Ok(load(path)?.contains(video_id))
}

/// Records a video the remote service refused to serve so neither yt-dlp nor
/// later runs try it again.
pub fn record_rejection(path: &Path, video_id: &str, reason: &str) -> Result<()> {
    record_rejection_at(path, video_id, reason, Utc::now())
}

fn record_rejection_at(
    path: &Path,
    video_id: &str,
    reason: &str,
    at: DateTime<Utc>,
) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening ledger {}", path.display()))?;
    let reason = reason.replace(['\r', '\n'], " ");
    writeln!(
        file,
        "# {} skipped {}: {}",
        at.to_rfc3339_opts(SecondsFormat::Secs, true),
        video_id,
        reason.trim()
    )
    .and_then(|_| writeln!(file, "{EXTRACTOR_KEY} {video_id}"))
    .with_context(|| format!("writing ledger entry for {video_id}"))?;
    Ok(())
}
