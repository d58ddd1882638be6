//! The subset of yt-dlp's `.info.json` the archiver relies on.

use chrono::{Datelike, NaiveDate};
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::error::FatalError;

/// Fields required to name links, plus the optional declared duration used by
/// the integrity audit.
#[derive(Debug, Clone, Deserialize)]
pub struct VideoMetadata {
    /// `YYYYMMDD`.
    pub upload_date: String,
    pub fulltitle: String,
    pub uploader: String,
    #[serde(default)]
    pub duration: Option<f64>,
}

/// Upload date split into the link components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadDate {
    pub year: String,
    pub month: String,
    pub day: String,
}

impl VideoMetadata {
    pub fn load(path: &Path) -> Result<Self, FatalError> {
        let file = File::open(path).map_err(|err| FatalError::Metadata {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|err| FatalError::Metadata {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })
    }

    /// Validates `upload_date` as a calendar date.
    pub fn upload_date_parts(&self) -> Option<UploadDate> {
        if self.upload_date.len() != 8 {
            return None;
        }
        let date = NaiveDate::parse_from_str(&self.upload_date, "%Y%m%d").ok()?;
        Some(UploadDate {
            year: format!("{:04}", date.year()),
            month: format!("{:02}", date.month()),
            day: format!("{:02}", date.day()),
        })
    }
}
