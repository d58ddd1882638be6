#![forbid(unsafe_code)]

//! Command-line front end of the archiver.
//!
//! `download` reads newline-delimited YouTube URLs from stdin and brings them
//! into the destination tree. `list incomplete` audits what is already there.

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use ytarchive_tools::archive_list::NativeProbe;
use ytarchive_tools::audit::list_incomplete;
use ytarchive_tools::batch::{DownloadOptions, download};
use ytarchive_tools::config::{RuntimeOverrides, RuntimeSettings, resolve_settings};
use ytarchive_tools::downloader::{DownloaderConfig, ensure_program_available};
use ytarchive_tools::layout::Paths;
use ytarchive_tools::url::video_url;

#[derive(Debug, Parser)]
#[command(name = "ytarchive", version, about = "Archive YouTube videos and channels with yt-dlp")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Download the URLs read from stdin into the destination.
    Download(DownloadArgs),
    /// Report on the archive.
    List {
        #[command(subcommand)]
        what: ListCommand,
    },
}

#[derive(Debug, Subcommand)]
enum ListCommand {
    /// Print URLs of archived videos shorter than their declared duration.
    Incomplete(IncompleteArgs),
}

#[derive(Debug, Args)]
struct DownloadArgs {
    #[arg(long)]
    destination: PathBuf,
    /// yt-dlp executable.
    #[arg(long)]
    downloader: Option<PathBuf>,
    #[arg(long)]
    socket_timeout: Option<u64>,
    /// Give up after this many passes instead of retrying forever.
    #[arg(long)]
    max_passes: Option<usize>,
    #[arg(long)]
    env_file: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct IncompleteArgs {
    #[arg(long)]
    destination: PathBuf,
    #[arg(long)]
    ffprobe: Option<PathBuf>,
    #[arg(long)]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let code = match cli.command {
        Command::Download(args) => run_download(args).await,
        Command::List {
            what: ListCommand::Incomplete(args),
        } => report(run_list_incomplete(args).await),
    };
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

fn report(result: Result<()>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {err:#}");
            1
        }
    }
}

async fn run_download(args: DownloadArgs) -> i32 {
    let (settings, urls) = match prepare_download(&args) {
        Ok(prepared) => prepared,
        Err(err) => {
            eprintln!("error: {err:#}");
            return 1;
        }
    };

    println!("===================================");
    println!("YouTube Archiver");
    println!("===================================");
    println!("Destination: {}", args.destination.display());
    println!("Downloader: {}", settings.downloader.display());
    println!("URLs: {}", urls.len());
    println!();

    let options = DownloadOptions {
        downloader: DownloaderConfig {
            program: settings.downloader.into_os_string(),
            socket_timeout: settings.socket_timeout,
        },
        max_passes: settings.max_passes,
    };

    match download(&args.destination, &urls, options, &NativeProbe).await {
        Ok(summary) => {
            println!();
            println!("===================================");
            println!("Download complete!");
            println!("===================================");
            println!("{summary}");
            0
        }
        Err(err) => {
            eprintln!("error: {err}");
            err.exit_code()
        }
    }
}

fn prepare_download(args: &DownloadArgs) -> Result<(RuntimeSettings, Vec<String>)> {
    ensure_destination(&args.destination)?;
    let settings = resolve_settings(RuntimeOverrides {
        downloader: args.downloader.clone(),
        ffprobe: None,
        socket_timeout: args.socket_timeout,
        max_passes: args.max_passes,
        env_path: args.env_file.clone(),
    })?;
    ensure_program_available(&settings.downloader)?;

    let input = io::read_to_string(io::stdin()).context("reading URLs from stdin")?;
    let urls = input
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect();
    Ok((settings, urls))
}

async fn run_list_incomplete(args: IncompleteArgs) -> Result<()> {
    ensure_destination(&args.destination)?;
    let settings = resolve_settings(RuntimeOverrides {
        ffprobe: args.ffprobe,
        env_path: args.env_file,
        ..RuntimeOverrides::default()
    })?;
    ensure_program_available(&settings.ffprobe)?;

    let paths = Paths::new(&args.destination);
    for video_id in list_incomplete(&paths, settings.ffprobe.as_os_str()).await? {
        println!("{}", video_url(&video_id));
    }
    Ok(())
}

fn ensure_destination(destination: &Path) -> Result<()> {
    if !destination.exists() {
        bail!("destination {} does not exist", destination.display());
    }
    if !destination.is_dir() {
        bail!("destination {} is not a directory", destination.display());
    }
    Ok(())
}
