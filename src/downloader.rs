//! Runs yt-dlp as a child process.
//!
//! Output is streamed live; stderr is also captured so the caller can look
//! for the "YouTube said: ..." rejection marker. While a child runs, interrupt
//! and terminate signals are forwarded to it and the run is aborted once it
//! exits.

use regex::Regex;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::LazyLock;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

pub use signals::SignalTrap;

static REJECTION_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"YouTube said: (?P<reason>.*\S)").expect("valid rejection regex")
});

static ERROR_VIDEO_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ERROR: \[youtube\] (?P<id>[A-Za-z0-9_-]+): ").expect("valid error regex")
});

#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    pub program: OsString,
    pub socket_timeout: u64,
}

/// What a single invocation should fetch.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    pub ledger: PathBuf,
    pub output_dir: PathBuf,
    /// Channels are fetched oldest first and keep going past per-video errors.
    pub channel: bool,
}

#[derive(Debug)]
pub struct Invocation {
    pub status: ExitStatus,
    pub stderr: Vec<String>,
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("could not start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("waiting for downloader: {0}")]
    Wait(#[source] io::Error),

    #[error("interrupted by signal {0}")]
    Interrupted(i32),
}

/// A rejection reported by the remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub video_id: Option<String>,
    pub reason: String,
}

/// Extracts every rejection marker from captured stderr lines.
pub fn rejections(stderr: &[String]) -> Vec<Rejection> {
    stderr
        .iter()
        .filter_map(|line| {
            let reason = REJECTION_MARKER.captures(line)?["reason"].to_owned();
            let video_id = ERROR_VIDEO_ID
                .captures(line)
                .map(|captures| captures["id"].to_owned());
            Some(Rejection { video_id, reason })
        })
        .collect()
}

/// Number of `ERROR:` lines yt-dlp printed.
pub fn error_count(stderr: &[String]) -> usize {
    stderr
        .iter()
        .filter(|line| line.starts_with("ERROR:"))
        .count()
}

pub fn arguments(config: &DownloaderConfig, request: &DownloadRequest) -> Vec<OsString> {
    let output = request.output_dir.join("%(id)s.%(ext)s");
    let mut args: Vec<OsString> = vec![
        request.url.clone().into(),
        "--download-archive".into(),
        request.ledger.clone().into(),
        "--write-info-json".into(),
        "--socket-timeout".into(),
        config.socket_timeout.to_string().into(),
        "--newline".into(),
        "--output".into(),
        output.into(),
    ];
    if request.channel {
        args.push("--playlist-reverse".into());
        args.push("--ignore-errors".into());
    } else {
        args.push("--no-playlist".into());
    }
    args
}

/// Runs the downloader to completion. Signals caught while it runs are
/// forwarded to the child and reported as [`DownloadError::Interrupted`].
pub async fn run(
    config: &DownloaderConfig,
    request: &DownloadRequest,
    signals: &mut SignalTrap,
) -> Result<Invocation, DownloadError> {
    if let Some(signal) = signals.pending() {
        return Err(DownloadError::Interrupted(signal));
    }

    let mut child = Command::new(&config.program)
        .args(arguments(config, request))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| DownloadError::Spawn {
            program: config.program.to_string_lossy().into_owned(),
            source,
        })?;

    let stdout = child.stdout.take().map(|pipe| {
        tokio::spawn(async move {
            let mut lines = BufReader::new(pipe).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                println!("  {line}");
            }
        })
    });
    let stderr = child.stderr.take().map(|pipe| {
        tokio::spawn(async move {
            let mut captured = Vec::new();
            let mut lines = BufReader::new(pipe).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                eprintln!("  {line}");
                captured.push(line);
            }
            captured
        })
    });

    let outcome = signals.forward_to(&mut child).await;
    let stderr = collect_output(stdout, stderr).await;
    let status = outcome?;
    Ok(Invocation { status, stderr })
}

async fn collect_output(
    stdout: Option<JoinHandle<()>>,
    stderr: Option<JoinHandle<Vec<String>>>,
) -> Vec<String> {
    if let Some(handle) = stdout {
        let _ = handle.await;
    }
    match stderr {
        Some(handle) => handle.await.unwrap_or_default(),
        None => Vec::new(),
    }
}

/// Runs `<program> --version` to fail loudly when a tool is missing.
pub fn ensure_program_available(program: &Path) -> anyhow::Result<()> {
    let status = std::process::Command::new(program)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match status {
        Ok(status) if status.success() => Ok(()),
        Ok(_) => anyhow::bail!(
            "{} is installed but returned a failure status",
            program.display()
        ),
        Err(err) => anyhow::bail!("{} is not installed or not in PATH: {}", program.display(), err),
    }
}

#[cfg(unix)]
mod signals {
    use futures::FutureExt;
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;
    use std::io;
    use std::process::ExitStatus;
    use tokio::process::Child;
    use tokio::signal::unix::{self, SignalKind};

    use super::DownloadError;

    /// Process-wide capture of SIGINT, SIGTERM and SIGHUP.
    ///
    /// Signals are only acted upon while [`SignalTrap::forward_to`] is waiting
    /// on a child; anything caught between children stays pending and stops
    /// the next spawn.
    pub struct SignalTrap {
        interrupt: unix::Signal,
        terminate: unix::Signal,
        hangup: unix::Signal,
    }

    impl SignalTrap {
        pub fn install() -> io::Result<Self> {
            Ok(Self {
                interrupt: unix::signal(SignalKind::interrupt())?,
                terminate: unix::signal(SignalKind::terminate())?,
                hangup: unix::signal(SignalKind::hangup())?,
            })
        }

        async fn recv(&mut self) -> Signal {
            tokio::select! {
                Some(()) = self.interrupt.recv() => Signal::SIGINT,
                Some(()) = self.terminate.recv() => Signal::SIGTERM,
                Some(()) = self.hangup.recv() => Signal::SIGHUP,
                else => std::future::pending().await,
            }
        }

        /// A signal that arrived while no child was running.
        pub fn pending(&mut self) -> Option<i32> {
            self.recv().now_or_never().map(|signal| signal as i32)
        }

        /// Waits for `child`, relaying any caught signal to it. The borrow of
        /// the trap ends with the child.
        pub async fn forward_to(&mut self, child: &mut Child) -> Result<ExitStatus, DownloadError> {
            let pid = child.id();
            tokio::select! {
                status = child.wait() => status.map_err(DownloadError::Wait),
                signal = self.recv() => {
                    if let Some(pid) = pid
                        && let Ok(raw) = i32::try_from(pid)
                        && let Err(err) = kill(Pid::from_raw(raw), signal)
                    {
                        tracing::warn!(%err, pid, signal = signal.as_str(), "could not forward signal to downloader");
                    }
                    let _ = child.wait().await;
                    Err(DownloadError::Interrupted(signal as i32))
                }
            }
        }
    }
}

#[cfg(not(unix))]
mod signals {
    use futures::FutureExt;
    use std::io;
    use std::process::ExitStatus;
    use tokio::process::Child;
    use tokio::signal::windows;

    use super::DownloadError;

    const SIGINT: i32 = 2;

    pub struct SignalTrap {
        ctrl_c: windows::CtrlC,
    }

    impl SignalTrap {
        pub fn install() -> io::Result<Self> {
            Ok(Self {
                ctrl_c: windows::ctrl_c()?,
            })
        }

        pub fn pending(&mut self) -> Option<i32> {
            self.ctrl_c.recv().now_or_never().flatten().map(|()| SIGINT)
        }

        pub async fn forward_to(&mut self, child: &mut Child) -> Result<ExitStatus, DownloadError> {
            tokio::select! {
                status = child.wait() => status.map_err(DownloadError::Wait),
                Some(()) = self.ctrl_c.recv() => {
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                    Err(DownloadError::Interrupted(SIGINT))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    fn config() -> DownloaderConfig {
        DownloaderConfig {
            program: "yt-dlp".into(),
            socket_timeout: 30,
        }
    }

    #[test]
    fn video_arguments_disable_playlists() {
        let request = DownloadRequest {
            url: "https://www.youtube.com/watch?v=abc".into(),
            ledger: PathBuf::from("/dest/meta/all.txt"),
            output_dir: PathBuf::from("/dest/temporary/abc"),
            channel: false,
        };
        let args = arguments(&config(), &request);
        let args: Vec<String> = args
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args[0], "https://www.youtube.com/watch?v=abc");
        assert!(args.windows(2).any(|w| w == ["--download-archive", "/dest/meta/all.txt"]));
        assert!(args.windows(2).any(|w| w == ["--socket-timeout", "30"]));
        assert!(
            args.windows(2)
                .any(|w| w == ["--output", "/dest/temporary/abc/%(id)s.%(ext)s"])
        );
        assert!(args.contains(&"--write-info-json".to_string()));
        assert!(args.contains(&"--no-playlist".to_string()));
        assert!(!args.contains(&"--playlist-reverse".to_string()));
    }

    #[test]
    fn channel_arguments_reverse_playlist() {
        let request = DownloadRequest {
            url: "https://www.youtube.com/channel/UC1".into(),
            ledger: PathBuf::from("all.txt"),
            output_dir: PathBuf::from("scratch"),
            channel: true,
        };
        let args = arguments(&config(), &request);
        assert!(args.contains(&OsString::from("--playlist-reverse")));
        assert!(args.contains(&OsString::from("--ignore-errors")));
        assert!(!args.contains(&OsString::from("--no-playlist")));
    }

    #[test]
    fn rejections_extract_reason_and_id() {
        let stderr = lines(&[
            "WARNING: something harmless",
            "ERROR: [youtube] xyz: Video unavailable. YouTube said: This video has been removed  ",
            "ERROR: unable to download webpage: timed out",
            "YouTube said: Sign in to confirm your age",
        ]);
        assert_eq!(
            rejections(&stderr),
            vec![
                Rejection {
                    video_id: Some("xyz".into()),
                    reason: "This video has been removed".into(),
                },
                Rejection {
                    video_id: None,
                    reason: "Sign in to confirm your age".into(),
                },
            ]
        );
        assert_eq!(error_count(&stderr), 2);
    }

    #[test]
    fn rejections_empty_without_marker() {
        let stderr = lines(&["ERROR: [youtube] abc: HTTP Error 503"]);
        assert!(rejections(&stderr).is_empty());
    }

    #[tokio::test]
    async fn signal_trap_has_nothing_pending_initially() -> anyhow::Result<()> {
        let mut trap = SignalTrap::install()?;
        assert_eq!(trap.pending(), None);
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_captures_stderr_and_status() -> anyhow::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir()?;
        let script = dir.path().join("fake-dl");
        std::fs::write(
            &script,
            "#!/bin/sh\necho \"downloading $1\"\necho 'ERROR: [youtube] abc: YouTube said: gone' >&2\nexit 1\n",
        )?;
        let mut perms = std::fs::metadata(&script)?.permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&script, perms)?;

        let config = DownloaderConfig {
            program: script.into_os_string(),
            socket_timeout: 5,
        };
        let request = DownloadRequest {
            url: "https://www.youtube.com/watch?v=abc".into(),
            ledger: dir.path().join("all.txt"),
            output_dir: dir.path().join("scratch"),
            channel: false,
        };
        let mut trap = SignalTrap::install()?;
        let invocation = run(&config, &request, &mut trap).await?;
        assert!(!invocation.status.success());
        assert_eq!(
            invocation.stderr,
            vec!["ERROR: [youtube] abc: YouTube said: gone".to_string()]
        );
        Ok(())
    }

    #[tokio::test]
    async fn run_reports_missing_program() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let config = DownloaderConfig {
            program: dir.path().join("does-not-exist").into_os_string(),
            socket_timeout: 5,
        };
        let request = DownloadRequest {
            url: "https://www.youtube.com/watch?v=abc".into(),
            ledger: dir.path().join("all.txt"),
            output_dir: dir.path().to_path_buf(),
            channel: false,
        };
        let mut trap = SignalTrap::install()?;
        let err = run(&config, &request, &mut trap).await.unwrap_err();
        assert!(matches!(err, DownloadError::Spawn { .. }));
        Ok(())
    }
}
