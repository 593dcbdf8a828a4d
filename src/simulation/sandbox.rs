//! Isolated execution of one generated workflow.
//!
//! Each run gets a private temporary directory holding the entry file, a
//! cleared environment (allow-listed variables plus the launch env, with
//! `HOME` pointed at the directory) and closed stdin. On unix the program
//! leads its own process group, and the whole group is killed when the run
//! ends, so background children cannot outlive the session.

use std::collections::BTreeMap;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::config::SimulationConfig;
use crate::logs::{LogStream, TerminalReason};

/// How long output is still collected after the program exits while
/// something it spawned keeps a pipe open.
const EXIT_DRAIN_GRACE: Duration = Duration::from_millis(500);

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    /// `None` on timeout, cancellation, launch failure, or signal termination.
    pub exit_code: Option<i32>,
    pub reason: TerminalReason,
}

impl Outcome {
    fn stopped(reason: TerminalReason) -> Self {
        Self {
            exit_code: None,
            reason,
        }
    }
}

enum Stop {
    Exited(std::io::Result<ExitStatus>),
    Cancelled,
    TimedOut,
}

/// Write `code` into a fresh directory and run it, calling `on_line` for
/// every stdout/stderr line in arrival order and for runner notices.
pub async fn execute<F>(
    config: &SimulationConfig,
    code: &str,
    env: &BTreeMap<String, String>,
    cancel: &CancellationToken,
    mut on_line: F,
) -> Outcome
where
    F: FnMut(LogStream, String) + Send,
{
    let dir = match tempfile::Builder::new().prefix("pipeline-sim-").tempdir() {
        Ok(dir) => dir,
        Err(e) => {
            on_line(LogStream::System, format!("failed to create sandbox directory: {}", e));
            return Outcome::stopped(TerminalReason::LaunchFailed);
        }
    };
    let entry = dir.path().join(&config.entry_file);
    if let Err(e) = tokio::fs::write(&entry, code).await {
        on_line(LogStream::System, format!("failed to write {}: {}", config.entry_file, e));
        return Outcome::stopped(TerminalReason::LaunchFailed);
    }

    let mut cmd = Command::new(&config.program);
    cmd.args(config.render_args(&entry, dir.path()))
        .current_dir(dir.path())
        .env_clear();
    for key in &config.env_allowlist {
        if let Ok(value) = std::env::var(key) {
            cmd.env(key, value);
        }
    }
    cmd.env("HOME", dir.path())
        .envs(&config.env)
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            tracing::warn!(program = %config.program, error = %e, "failed to launch simulation");
            on_line(
                LogStream::System,
                format!("failed to launch '{}': {}", config.program, e),
            );
            return Outcome::stopped(TerminalReason::LaunchFailed);
        }
    };
    let pid = child.id();
    tracing::debug!(program = %config.program, pid = ?pid, "simulation launched");

    let max_line = config.max_output_bytes.max(1);
    let (tx, mut rx) = mpsc::channel(64);
    if let Some(stdout) = child.stdout.take() {
        pump(stdout, LogStream::Stdout, max_line, tx.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        pump(stderr, LogStream::Stderr, max_line, tx.clone());
    }
    drop(tx);

    let deadline = tokio::time::sleep(config.timeout());
    tokio::pin!(deadline);
    // Re-armed to EXIT_DRAIN_GRACE once the program has exited.
    let drain = tokio::time::sleep(config.timeout());
    tokio::pin!(drain);
    let mut open = true;
    let mut exited: Option<std::io::Result<ExitStatus>> = None;

    // An exit observed before cancellation or the deadline still counts as an exit.
    let stop = loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break exited.take().map_or(Stop::Cancelled, Stop::Exited),
            _ = &mut deadline => break exited.take().map_or(Stop::TimedOut, Stop::Exited),
            msg = rx.recv(), if open => match msg {
                Some((stream, line)) => on_line(stream, line),
                None => open = false,
            },
            status = child.wait(), if exited.is_none() => {
                exited = Some(status);
                drain.as_mut().reset(Instant::now() + EXIT_DRAIN_GRACE);
            }
            _ = &mut drain, if exited.is_some() => {
                tracing::debug!("output still open after exit; closing");
                break exited.take().map_or(Stop::TimedOut, Stop::Exited);
            }
        }
        if !open {
            if let Some(status) = exited.take() {
                break Stop::Exited(status);
            }
        }
    };

    kill_group(pid).await;
    if !matches!(stop, Stop::Exited(_)) {
        if let Err(e) = child.kill().await {
            tracing::warn!(error = %e, "failed to kill simulation process");
        }
    }
    while let Ok((stream, line)) = rx.try_recv() {
        on_line(stream, line);
    }

    match stop {
        Stop::Exited(Ok(status)) => match status.code() {
            Some(code) => Outcome {
                exit_code: Some(code),
                reason: TerminalReason::Exited,
            },
            None => {
                on_line(LogStream::System, format!("process terminated: {}", status));
                Outcome::stopped(TerminalReason::Exited)
            }
        },
        Stop::Exited(Err(e)) => {
            on_line(LogStream::System, format!("failed to wait for process: {}", e));
            Outcome::stopped(TerminalReason::Exited)
        }
        Stop::TimedOut => {
            on_line(
                LogStream::System,
                format!("timed out after {} ms", config.timeout_ms),
            );
            Outcome::stopped(TerminalReason::TimedOut)
        }
        Stop::Cancelled => {
            on_line(LogStream::System, "cancelled".to_string());
            Outcome::stopped(TerminalReason::Cancelled)
        }
    }
}

/// SIGKILL every process left in the group led by `pid`.
#[cfg(unix)]
async fn kill_group(pid: Option<u32>) {
    let Some(pid) = pid else {
        return;
    };
    let status = Command::new("sh")
        .arg("-c")
        .arg("kill -KILL -\"$1\" 2>/dev/null")
        .arg("sh")
        .arg(pid.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    if let Err(e) = status {
        tracing::warn!(pgid = pid, error = %e, "failed to signal process group");
    }
}

#[cfg(not(unix))]
async fn kill_group(_pid: Option<u32>) {}

/// Forward lines from `reader` until EOF. Lines longer than `max_line` bytes
/// are split; invalid UTF-8 is replaced.
fn pump<R>(reader: R, stream: LogStream, max_line: usize, tx: mpsc::Sender<(LogStream, String)>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf: Vec<u8> = Vec::new();
        loop {
            let (used, complete) = match reader.fill_buf().await {
                Ok([]) => {
                    if !buf.is_empty() {
                        let _ = tx.send((stream, into_line(&buf))).await;
                    }
                    break;
                }
                Ok(chunk) => {
                    // One byte past the room so a newline right at the limit ends this line.
                    let room = max_line - buf.len();
                    let scan = &chunk[..chunk.len().min(room + 1)];
                    match scan.iter().position(|&b| b == b'\n') {
                        Some(i) => {
                            buf.extend_from_slice(&scan[..i]);
                            (i + 1, true)
                        }
                        None => {
                            let take = scan.len().min(room);
                            buf.extend_from_slice(&scan[..take]);
                            (take, buf.len() >= max_line)
                        }
                    }
                }
                Err(e) => {
                    tracing::debug!(?stream, error = %e, "output pipe read failed");
                    break;
                }
            };
            reader.consume(used);
            if complete {
                if tx.send((stream, into_line(&buf))).await.is_err() {
                    break;
                }
                buf.clear();
            }
        }
    });
}

fn into_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}
