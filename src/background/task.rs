//! Background task state structures
//!
//! A [`BackgroundTask`] is created by the manager when a process is spawned
//! and mutated only by its own monitor task and by explicit kill/remove.
//! Output buffers carry their own lock, independent of the registry lock, so
//! listing never waits on output capture.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Rolling per-stream output cap (1 MiB). Buffers keep the tail.
pub(crate) const MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Lifecycle status of a background task.
///
/// Transitions only move forward: `Running` to exactly one terminal state,
/// which never changes afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Process is alive and being monitored
    Running,
    /// Process exited normally with code 0
    Success,
    /// Process exited with a non-zero or undeterminable code
    Failed,
    /// Process was terminated through `kill_task` / `remove_task`
    Killed,
}

impl TaskStatus {
    /// Whether this status is terminal.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Killed => "killed",
        };
        f.write_str(s)
    }
}

/// Accumulated output, tail-truncated at [`MAX_OUTPUT_BYTES`] per stream.
///
/// The totals count every byte ever appended, surviving truncation, so
/// followers can locate their unseen tail inside the retained buffer.
#[derive(Debug, Default)]
pub(crate) struct TaskBuffers {
    pub stdout: String,
    pub stderr: String,
    pub stdout_total: u64,
    pub stderr_total: u64,
}

impl TaskBuffers {
    pub fn append_stdout(&mut self, line: &str) {
        self.stdout.push_str(line);
        self.stdout.push('\n');
        self.stdout_total += line.len() as u64 + 1;
        truncate_tail(&mut self.stdout, MAX_OUTPUT_BYTES);
    }

    pub fn append_stderr(&mut self, line: &str) {
        self.stderr.push_str(line);
        self.stderr.push('\n');
        self.stderr_total += line.len() as u64 + 1;
        truncate_tail(&mut self.stderr, MAX_OUTPUT_BYTES);
    }
}

/// Keep roughly `max` bytes from the tail, letting the buffer grow to twice
/// the cap between truncations to avoid constant reallocation. The cut is
/// advanced to a char boundary so multi-byte UTF-8 sequences never split.
fn truncate_tail(buf: &mut String, max: usize) {
    if buf.len() > max * 2 {
        let mut cut = buf.len() - max;
        while cut < buf.len() && !buf.is_char_boundary(cut) {
            cut += 1;
        }
        buf.drain(..cut);
    }
}

/// Terminal metadata, written once by the monitor.
#[derive(Debug, Default)]
struct TaskMeta {
    exit_code: Option<i32>,
    ended_at: Option<DateTime<Utc>>,
}

/// One tracked background process.
#[derive(Debug)]
pub struct BackgroundTask {
    id: String,
    command: String,
    workdir: Option<PathBuf>,
    started_at: DateTime<Utc>,
    pid: Option<u32>,
    status_rx: watch::Receiver<TaskStatus>,
    meta: Mutex<TaskMeta>,
    buffers: Mutex<TaskBuffers>,
    cancel: CancellationToken,
}

impl BackgroundTask {
    /// Create task state for a freshly spawned process. Returns the task and
    /// the status sender that only the monitor task may use.
    pub(crate) fn new(
        id: String,
        command: String,
        workdir: Option<PathBuf>,
        pid: Option<u32>,
    ) -> (Self, watch::Sender<TaskStatus>) {
        let (status_tx, status_rx) = watch::channel(TaskStatus::Running);
        let task = Self {
            id,
            command,
            workdir,
            started_at: Utc::now(),
            pid,
            status_rx,
            meta: Mutex::new(TaskMeta::default()),
            buffers: Mutex::new(TaskBuffers::default()),
            cancel: CancellationToken::new(),
        };
        (task, status_tx)
    }

    /// Unique, monotonically assigned task id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The command line this task runs.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// OS process id, when the platform reported one.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> TaskStatus {
        *self.status_rx.borrow()
    }

    /// Whether the task is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.status().is_terminal()
    }

    /// Exit code, when the process terminated with a determinable one.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        self.meta.lock().exit_code
    }

    /// Clone of the captured (and possibly tail-truncated) output buffers as
    /// `(stdout, stderr)`.
    #[must_use]
    pub fn output(&self) -> (String, String) {
        let buffers = self.buffers.lock();
        (buffers.stdout.clone(), buffers.stderr.clone())
    }

    /// Cancellation handle; firing it makes the monitor kill the process
    /// tree and record `Killed`.
    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Buffers plus their cumulative append totals, taken under one lock so
    /// a follower sees a consistent pair per stream.
    pub(crate) fn output_with_totals(&self) -> (String, String, u64, u64) {
        let buffers = self.buffers.lock();
        (
            buffers.stdout.clone(),
            buffers.stderr.clone(),
            buffers.stdout_total,
            buffers.stderr_total,
        )
    }

    pub(crate) fn append_stdout(&self, line: &str) {
        self.buffers.lock().append_stdout(line);
    }

    pub(crate) fn append_stderr(&self, line: &str) {
        self.buffers.lock().append_stderr(line);
    }

    /// Record terminal metadata. Called exactly once, by the monitor, right
    /// before it publishes the terminal status.
    pub(crate) fn record_end(&self, exit_code: Option<i32>) {
        let mut meta = self.meta.lock();
        if meta.ended_at.is_none() {
            meta.exit_code = exit_code;
            meta.ended_at = Some(Utc::now());
        }
    }

    /// Wait until the task leaves `Running`.
    pub async fn wait_terminal(&self) -> TaskStatus {
        let mut rx = self.status_rx.clone();
        match rx.wait_for(|status| status.is_terminal()).await {
            Ok(status) => *status,
            // Sender dropped without a terminal send: the monitor panicked.
            Err(_) => self.status(),
        }
    }

    /// Cheap serializable view of the task.
    #[must_use]
    pub fn snapshot(&self) -> TaskSnapshot {
        let meta = self.meta.lock();
        let buffers = self.buffers.lock();
        TaskSnapshot {
            id: self.id.clone(),
            command: self.command.clone(),
            workdir: self
                .workdir
                .as_ref()
                .map(|p| p.display().to_string()),
            status: self.status(),
            exit_code: meta.exit_code,
            started_at: self.started_at,
            ended_at: meta.ended_at,
            stdout_bytes: buffers.stdout.len(),
            stderr_bytes: buffers.stderr.len(),
        }
    }
}

/// Point-in-time view of a task for listing and inspection.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    /// Task id
    pub id: String,
    /// Command line
    pub command: String,
    /// Working directory override, if any
    pub workdir: Option<String>,
    /// Status at snapshot time
    pub status: TaskStatus,
    /// Exit code, when terminal and determinable
    pub exit_code: Option<i32>,
    /// When the process was spawned
    pub started_at: DateTime<Utc>,
    /// When the monitor recorded completion
    pub ended_at: Option<DateTime<Utc>>,
    /// Captured stdout size in bytes
    pub stdout_bytes: usize,
    /// Captured stderr size in bytes
    pub stderr_bytes: usize,
}
