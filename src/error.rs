//! Failure taxonomy shared by the orchestrator and the batch loop.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::downloader::DownloadError;

/// Conditions that abort the whole run.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("invalid URL: {0:?}")]
    InvalidUrl(String),

    #[error("multiple archived files found for {video_id}: {}", .files.join(", "))]
    MultipleVideoFound { video_id: String, files: Vec<String> },

    #[error("metadata {}: {reason}", .path.display())]
    Metadata { path: PathBuf, reason: String },

    #[error("could not link {}: {source}", .path.display())]
    Link {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("interrupted by signal {0}")]
    Interrupted(i32),
}

impl FatalError {
    /// Process exit code matching the failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            FatalError::Interrupted(signal) => 128 + signal,
            _ => 1,
        }
    }
}

/// Error returned by a single item; the batch loop branches on the variant.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error(transparent)]
    Fatal(#[from] FatalError),

    #[error("{0:#}")]
    Recoverable(anyhow::Error),
}

impl From<io::Error> for ItemError {
    fn from(err: io::Error) -> Self {
        ItemError::Recoverable(err.into())
    }
}

impl From<anyhow::Error> for ItemError {
    fn from(err: anyhow::Error) -> Self {
        ItemError::Recoverable(err)
    }
}

impl From<DownloadError> for ItemError {
    fn from(err: DownloadError) -> Self {
        match err {
            DownloadError::Interrupted(signal) => ItemError::Fatal(FatalError::Interrupted(signal)),
            other => ItemError::Recoverable(other.into()),
        }
    }
}
