#![forbid(unsafe_code)]

//! Building blocks of the `ytarchive` binary: URL classification, archive
//! inspection, the yt-dlp driver, hardlink views and the batch retry loop.

pub mod archive_list;
pub mod audit;
pub mod batch;
pub mod config;
pub mod downloader;
pub mod error;
pub mod inspect;
pub mod layout;
pub mod ledger;
pub mod links;
pub mod metadata;
pub mod orchestrator;
pub mod url;
