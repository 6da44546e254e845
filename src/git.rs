use std::path::Path;
use std::process::{Output, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command as AsyncCommand;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::progress::{current_line, ProgressParser, TransferProgress};

/// Commands run, in order, to bring an existing mirror up to date
pub const UPDATE_STEPS: [&[&str]; 4] = [
    &["pull", "--recurse-submodules"],
    &["submodule", "update", "--init", "--recursive"],
    &["fetch", "--all"],
    &["fetch", "--prune", "--tags"],
];

/// Which pipe a chunk came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// Result of one transfer subprocess
#[derive(Debug, Clone)]
pub struct TransferStatus {
    pub code: Option<i32>,
    pub progress: TransferProgress,
}

impl TransferStatus {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Thin driver around the `git` executable.
///
/// Every invocation receives its working directory explicitly; the process
/// working directory is never touched.
#[derive(Debug, Clone)]
pub struct GitClient {
    program: String,
    clone_depth: Option<u32>,
}

impl GitClient {
    pub fn new(clone_depth: Option<u32>) -> Self {
        Self {
            program: "git".to_string(),
            clone_depth,
        }
    }

    fn command(&self, dir: &Path, args: &[&str]) -> AsyncCommand {
        let mut cmd = AsyncCommand::new(&self.program);
        cmd.args(args)
            .current_dir(dir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null());
        cmd
    }

    /// Arguments for a fresh clone of `url` into `target`
    pub fn clone_args(&self, url: &str, target: &str) -> Vec<String> {
        let mut args = vec![
            "clone".to_string(),
            "--progress".to_string(),
            url.to_string(),
            target.to_string(),
        ];
        if let Some(depth) = self.clone_depth {
            args.push("--depth".to_string());
            args.push(depth.to_string());
        }
        args
    }

    /// Run git to completion and capture its output
    pub async fn output(&self, dir: &Path, args: &[&str]) -> Result<Output, SyncError> {
        self.command(dir, args)
            .output()
            .await
            .map_err(|source| SyncError::Launch {
                command: args.join(" "),
                source,
            })
    }

    /// Run one git step, turning a non-zero exit into [`SyncError::NonZeroExit`]
    pub async fn run_step(&self, dir: &Path, args: &[&str]) -> Result<(), SyncError> {
        debug!("Running git {} in {}", args.join(" "), dir.display());
        let output = self.output(dir, args).await?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if let Some(first) = stderr.lines().find(|l| !l.trim().is_empty()) {
            info!("git {}: {}", args.join(" "), first.trim());
        }

        if output.status.success() {
            Ok(())
        } else {
            Err(SyncError::NonZeroExit {
                command: args.join(" "),
                code: output.status.code(),
                dir: dir.to_path_buf(),
            })
        }
    }

    /// Name of the checked-out local branch
    pub async fn current_branch(&self, dir: &Path) -> Result<String, SyncError> {
        let output = self.checked_output(dir, &["branch"]).await?;
        parse_current_branch(&String::from_utf8_lossy(&output.stdout)).ok_or_else(|| {
            SyncError::RepairPrecondition {
                path: dir.to_path_buf(),
                detail: "no checked-out local branch".to_string(),
            }
        })
    }

    /// Name of the single configured remote
    pub async fn sole_remote(&self, dir: &Path) -> Result<String, SyncError> {
        let output = self.checked_output(dir, &["remote"]).await?;
        parse_sole_remote(&String::from_utf8_lossy(&output.stdout)).map_err(|detail| {
            SyncError::RepairPrecondition {
                path: dir.to_path_buf(),
                detail,
            }
        })
    }

    async fn checked_output(&self, dir: &Path, args: &[&str]) -> Result<Output, SyncError> {
        let output = self.output(dir, args).await?;
        if !output.status.success() {
            return Err(SyncError::NonZeroExit {
                command: args.join(" "),
                code: output.status.code(),
                dir: dir.to_path_buf(),
            });
        }
        Ok(output)
    }

    /// Clone `url` into `target` (relative to `dir`), streaming progress.
    ///
    /// `on_progress` receives the full snapshot after every chunk read from
    /// either pipe. The exit code is reported, not judged.
    pub async fn clone_with_progress(
        &self,
        dir: &Path,
        url: &str,
        target: &str,
        on_progress: &mut (dyn FnMut(&TransferProgress) + Send),
    ) -> Result<TransferStatus, SyncError> {
        let args = self.clone_args(url, target);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        info!("Executing command: git {}", args.join(" "));

        let mut child = self
            .command(dir, &arg_refs)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| SyncError::Launch {
                command: args.join(" "),
                source,
            })?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut pumps = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            pumps.push(tokio::spawn(pump_chunks(stdout, StreamKind::Stdout, tx.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(tokio::spawn(pump_chunks(stderr, StreamKind::Stderr, tx.clone())));
        }
        drop(tx);

        let progress = repaint_chunks(&mut rx, on_progress).await;

        for pump in pumps {
            match pump.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Error reading git output: {}", e),
                Err(e) => warn!("Output reader task failed: {}", e),
            }
        }

        let status = child.wait().await.map_err(|source| SyncError::Launch {
            command: args.join(" "),
            source,
        })?;

        Ok(TransferStatus {
            code: status.code(),
            progress,
        })
    }
}

/// Feed every chunk to a fresh parser and repaint after each one, matched or
/// not. Returns once the channel closes, i.e. both pipes hit end-of-file.
async fn repaint_chunks(
    rx: &mut mpsc::UnboundedReceiver<(StreamKind, String)>,
    on_progress: &mut (dyn FnMut(&TransferProgress) + Send),
) -> TransferProgress {
    let mut parser = ProgressParser::new();
    while let Some((kind, chunk)) = rx.recv().await {
        if kind == StreamKind::Stderr {
            let line = current_line(&chunk);
            if !line.is_empty() {
                debug!("[stderr] {}", line);
            }
        }
        on_progress(parser.feed(&chunk));
    }
    parser.into_snapshot()
}

/// Forward `reader` as chunks ending at '\r' or '\n' (terminator included)
async fn pump_chunks<R>(
    reader: R,
    kind: StreamKind,
    tx: mpsc::UnboundedSender<(StreamKind, String)>,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut chunk = Vec::new();

    loop {
        let (consumed, complete) = {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                break;
            }
            match available.iter().position(|b| *b == b'\r' || *b == b'\n') {
                Some(pos) => {
                    chunk.extend_from_slice(&available[..=pos]);
                    (pos + 1, true)
                }
                None => {
                    chunk.extend_from_slice(available);
                    (available.len(), false)
                }
            }
        };
        reader.consume(consumed);

        if complete {
            let text = String::from_utf8_lossy(&chunk).into_owned();
            chunk.clear();
            if tx.send((kind, text)).is_err() {
                return Ok(());
            }
        }
    }

    if !chunk.is_empty() {
        let _ = tx.send((kind, String::from_utf8_lossy(&chunk).into_owned()));
    }
    Ok(())
}

/// Pick the `* name` line out of `git branch` output
pub fn parse_current_branch(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| line.strip_prefix("* "))
        .map(str::trim)
        .filter(|name| !name.is_empty() && !name.starts_with('('))
        .map(str::to_string)
}

/// Exactly one remote name from `git remote` output
pub fn parse_sole_remote(output: &str) -> Result<String, String> {
    let remotes: Vec<&str> = output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    match remotes.as_slice() {
        [remote] => Ok(remote.to_string()),
        [] => Err("no remote configured".to_string()),
        many => Err(format!("expected one remote, found {}: {}", many.len(), many.join(", "))),
    }
}
