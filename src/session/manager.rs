//! Persistent interactive shell sessions
//!
//! One [`ShellSessionManager`] owns at most one live shell process at a time.
//! Commands are serialized against it with a mutex, completion is detected by
//! the sentinel marker framing, and any failure or timeout tears the session
//! down so the next call transparently rebuilds it. Sessions are destroyed
//! and replaced, never repaired in place.

use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::framing::MarkerScanner;
use crate::error::{ExecError, Result};
use crate::platform;

/// A live session: the shell process and its three streams.
///
/// The stdout/stderr readers are `Option` because each `execute` call moves
/// them into reader tasks and puts them back on success. A session found with
/// missing readers (a previous call was cancelled mid-flight) is discarded.
struct ShellSession {
    child: Child,
    stdin: ChildStdin,
    stdout: Option<BufReader<ChildStdout>>,
    stderr: Option<BufReader<ChildStderr>>,
}

impl ShellSession {
    async fn start() -> Result<Self> {
        let mut cmd = platform::session_shell_command()?;
        let mut child = cmd.spawn().map_err(|e| {
            ExecError::session_start(format!(
                "failed to spawn {} session: {e}",
                platform::session_shell_kind()
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ExecError::session_start("failed to capture session stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExecError::session_start("failed to capture session stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ExecError::session_start("failed to capture session stderr"))?;

        log::debug!(
            "started {} session (pid {:?})",
            platform::session_shell_kind(),
            child.id()
        );

        Ok(Self {
            child,
            stdin,
            stdout: Some(BufReader::new(stdout)),
            stderr: Some(BufReader::new(stderr)),
        })
    }

    /// Kill the shell and every descendant in its process group.
    async fn kill_tree(&mut self) {
        if let Some(pid) = self.child.id() {
            platform::kill_process_tree(pid).await;
        }
        let _ = self.child.kill().await;
    }
}

impl Drop for ShellSession {
    fn drop(&mut self) {
        // Best-effort kill if the session is discarded while still alive.
        let _ = self.child.start_kill();
    }
}

/// Manages the single persistent shell session for one execution context.
pub struct ShellSessionManager {
    session: Mutex<Option<ShellSession>>,
    cancel: CancellationToken,
}

impl ShellSessionManager {
    /// Create a manager with no live session; the shell starts lazily on the
    /// first `execute` call.
    #[must_use]
    pub fn new() -> Self {
        Self::with_cancellation(CancellationToken::new())
    }

    /// Create a manager tied to a parent cancellation token. Cancelling the
    /// token kills the underlying shell of any in-flight command.
    #[must_use]
    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self {
            session: Mutex::new(None),
            cancel,
        }
    }

    /// Whether a session process is currently live.
    pub async fn is_running(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// Tear down the live session, if any.
    pub async fn shutdown(&self) {
        if let Some(mut session) = self.session.lock().await.take() {
            session.kill_tree().await;
        }
    }

    /// Execute one command against the persistent session.
    ///
    /// Blocks until the sentinel marker is observed on both streams, the
    /// timeout elapses, or the manager's cancellation token fires. A timeout
    /// is **not** an error: the session is torn down and a human-readable
    /// "timed out" message is returned as ordinary output.
    ///
    /// # Errors
    /// Returns an error if the session cannot be started, a stream read or
    /// write fails (the session is marked dead and rebuilt on the next
    /// call), or the operation is cancelled.
    pub async fn execute(
        &self,
        command: &str,
        workdir: Option<&Path>,
        timeout: Duration,
    ) -> Result<String> {
        let mut guard = self.session.lock().await;

        let needs_new = match guard.as_ref() {
            None => true,
            Some(s) => s.stdout.is_none() || s.stderr.is_none(),
        };
        if needs_new {
            if let Some(mut old) = guard.take() {
                old.kill_tree().await;
            }
            *guard = Some(ShellSession::start().await?);
        }

        let marker = platform::generate_marker();
        let wrapped = platform::build_wrapped_command(command, workdir, &marker)?;

        // Write the wrapped command line.
        let write_result = match guard.as_mut() {
            Some(session) => {
                match session.stdin.write_all(wrapped.as_bytes()).await {
                    Ok(()) => session.stdin.flush().await,
                    Err(e) => Err(e),
                }
            }
            None => {
                return Err(ExecError::session_start("session unavailable"));
            }
        };
        if let Err(e) = write_result {
            if let Some(mut old) = guard.take() {
                old.kill_tree().await;
            }
            return Err(ExecError::session_io(format!(
                "failed to write command to session: {e}"
            )));
        }

        // Move both readers into concurrent scanner tasks.
        let (stdout_reader, stderr_reader) = {
            let Some(session) = guard.as_mut() else {
                return Err(ExecError::session_start("session unavailable"));
            };
            match (session.stdout.take(), session.stderr.take()) {
                (Some(out), Some(err)) => (out, err),
                _ => {
                    if let Some(mut old) = guard.take() {
                        old.kill_tree().await;
                    }
                    return Err(ExecError::session_io("session streams unavailable"));
                }
            }
        };

        let out_task = tokio::spawn(read_until_marker(stdout_reader, marker.clone()));
        let err_task = tokio::spawn(read_until_marker(stderr_reader, marker.clone()));
        let out_abort = out_task.abort_handle();
        let err_abort = err_task.abort_handle();

        let joined = tokio::select! {
            () = self.cancel.cancelled() => {
                out_abort.abort();
                err_abort.abort();
                if let Some(mut old) = guard.take() {
                    old.kill_tree().await;
                }
                return Err(ExecError::interrupted("operator cancelled the command"));
            }
            joined = tokio::time::timeout(timeout, async {
                tokio::join!(out_task, err_task)
            }) => joined,
        };

        let (out_join, err_join) = match joined {
            Ok(results) => results,
            Err(_) => {
                // Timeout: the next call rebuilds the session. The reader
                // tasks drain to EOF on their own once the tree is dead.
                if let Some(mut old) = guard.take() {
                    old.kill_tree().await;
                }
                log::warn!("command timed out after {timeout:?}: {command}");
                return Ok(format!("Command timed out after {timeout:?}"));
            }
        };

        let (out_reader, out_scan) = unwrap_reader_result(out_join, &mut guard).await?;
        let (err_reader, err_scan) = unwrap_reader_result(err_join, &mut guard).await?;

        // Return the streams to the session for the next invocation.
        if let Some(session) = guard.as_mut() {
            session.stdout = Some(out_reader);
            session.stderr = Some(err_reader);
        }

        let exit_code = out_scan.exit_code().unwrap_or(0);
        let mut output = out_scan.into_output();
        let stderr_text = err_scan.into_output();

        if exit_code != 0 {
            if output.is_empty() {
                output = format!("[exit code: {exit_code}]");
            } else {
                output.push_str(&format!("\n[exit code: {exit_code}]"));
            }
        }
        if !stderr_text.is_empty() {
            output.push_str(&format!("\nSTDERR:\n{stderr_text}"));
        }

        Ok(output)
    }
}

impl Default for ShellSessionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Drain one stream line by line until the scanner observes the marker,
/// returning the reader (still buffered and reusable) and the scanner.
async fn read_until_marker<R>(
    mut reader: R,
    marker: String,
) -> std::io::Result<(R, MarkerScanner)>
where
    R: AsyncBufRead + Unpin,
{
    let mut scanner = MarkerScanner::new(marker);
    let mut line = String::new();
    loop {
        line.clear();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "session shell closed its stream before the marker",
            ));
        }
        let trimmed = line.trim_end_matches('\n').trim_end_matches('\r');
        if scanner.feed_line(trimmed) {
            break;
        }
    }
    Ok((reader, scanner))
}

/// Collapse a reader task's join/io result, tearing the session down on any
/// failure so the next call starts fresh.
async fn unwrap_reader_result<R>(
    join: std::result::Result<std::io::Result<(R, MarkerScanner)>, tokio::task::JoinError>,
    guard: &mut tokio::sync::MutexGuard<'_, Option<ShellSession>>,
) -> Result<(R, MarkerScanner)> {
    match join {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            if let Some(mut old) = guard.take() {
                old.kill_tree().await;
            }
            Err(ExecError::session_io(format!("stream read failed: {e}")))
        }
        Err(e) => {
            if let Some(mut old) = guard.take() {
                old.kill_tree().await;
            }
            Err(ExecError::session_io(format!("reader task failed: {e}")))
        }
    }
}
