//! Background task registry
//!
//! An explicitly constructed registry of detached child processes. The
//! composing application owns the instance and passes it by reference;
//! nothing here is process-wide state, which also lets tests run several
//! isolated registries side by side.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::RwLock;

use super::task::{BackgroundTask, TaskSnapshot, TaskStatus};
use crate::error::{ExecError, Result};
use crate::platform;

/// Poll interval for follow-mode output streaming
const FOLLOW_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Registry of background tasks with monotonically assigned ids.
///
/// The registry lock is a read/write lock so listing proceeds concurrently
/// with task starts; each task's output buffer carries its own lock.
pub struct BackgroundTaskManager {
    tasks: RwLock<HashMap<String, Arc<BackgroundTask>>>,
    next_id: AtomicU64,
}

impl BackgroundTaskManager {
    /// Create an empty registry. Ids start at 1 and are never reused.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Spawn a detached process and start tracking it.
    ///
    /// The process runs in its own process group, so it survives caller
    /// cancellation and dies as a unit when killed. Control returns as soon
    /// as the process is spawned; capture and monitoring run on their own
    /// tasks.
    ///
    /// # Errors
    /// Returns an error if the shell cannot be located or the process fails
    /// to spawn.
    pub async fn start_task(
        &self,
        command: &str,
        workdir: Option<&Path>,
    ) -> Result<Arc<BackgroundTask>> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();

        let mut cmd = platform::spawn_one_shot_command(command, workdir)?;
        let mut child = cmd
            .spawn()
            .map_err(|e| ExecError::task_spawn(format!("{command}: {e}")))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (task, status_tx) = BackgroundTask::new(
            id.clone(),
            command.to_string(),
            workdir.map(PathBuf::from),
            child.id(),
        );
        let task = Arc::new(task);
        self.tasks.write().await.insert(id.clone(), Arc::clone(&task));

        // Line-buffered capture into the task's own buffers.
        let out_handle = tokio::spawn({
            let task = Arc::clone(&task);
            async move {
                if let Some(out) = stdout {
                    let mut lines = BufReader::new(out).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        task.append_stdout(&line);
                    }
                }
            }
        });
        let err_handle = tokio::spawn({
            let task = Arc::clone(&task);
            async move {
                if let Some(err) = stderr {
                    let mut lines = BufReader::new(err).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        task.append_stderr(&line);
                    }
                }
            }
        });

        // Monitor: waits for exit or cancellation and publishes the one
        // terminal status transition.
        let monitor_task = Arc::clone(&task);
        tokio::spawn(async move {
            let cancel = monitor_task.cancel_token().clone();
            let (status, code) = tokio::select! {
                () = cancel.cancelled() => {
                    if let Some(pid) = monitor_task.pid() {
                        platform::kill_process_tree(pid).await;
                    }
                    let _ = child.wait().await;
                    (TaskStatus::Killed, None)
                }
                exit = child.wait() => match exit {
                    Ok(s) if s.success() => (TaskStatus::Success, Some(0)),
                    Ok(s) => (TaskStatus::Failed, s.code()),
                    Err(e) => {
                        log::warn!("wait for task {} failed: {e}", monitor_task.id());
                        (TaskStatus::Failed, None)
                    }
                }
            };

            // Let the readers drain to EOF first, so followers observing the
            // terminal status see the complete output.
            let _ = tokio::join!(out_handle, err_handle);

            monitor_task.record_end(code);
            let _ = status_tx.send(status);
            log::debug!("background task {} finished: {status}", monitor_task.id());
        });

        log::info!("started background task {id}: {command}");
        Ok(task)
    }

    /// Snapshot every tracked task, running tasks first, newest first within
    /// each group.
    pub async fn list_tasks(&self) -> Vec<TaskSnapshot> {
        let tasks = self.tasks.read().await;
        let mut snapshots: Vec<TaskSnapshot> = tasks.values().map(|t| t.snapshot()).collect();
        snapshots.sort_by(snapshot_order);
        snapshots
    }

    /// Look up one task by id.
    ///
    /// # Errors
    /// Returns [`ExecError::TaskNotFound`] for unknown ids.
    pub async fn get_task(&self, id: &str) -> Result<Arc<BackgroundTask>> {
        self.tasks
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| ExecError::task_not_found(id))
    }

    /// Kill a running task and its entire process tree.
    ///
    /// Waits until the monitor has recorded the `Killed` status.
    ///
    /// # Errors
    /// Returns an error if the task is unknown or already terminal.
    pub async fn kill_task(&self, id: &str) -> Result<()> {
        let task = self.get_task(id).await?;
        if !task.is_running() {
            return Err(ExecError::task_not_running(id));
        }
        task.cancel_token().cancel();
        task.wait_terminal().await;
        Ok(())
    }

    /// Remove a task from the registry, killing it first when still running.
    ///
    /// The registry write lock is held across kill-and-remove, so no other
    /// caller can observe a removed-but-still-running task. Returns the
    /// final snapshot of the removed task.
    ///
    /// # Errors
    /// Returns [`ExecError::TaskNotFound`] for unknown ids.
    pub async fn remove_task(&self, id: &str) -> Result<TaskSnapshot> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get(id)
            .cloned()
            .ok_or_else(|| ExecError::task_not_found(id))?;

        if task.is_running() {
            task.cancel_token().cancel();
            task.wait_terminal().await;
        }
        tasks.remove(id);
        Ok(task.snapshot())
    }

    /// Stream a task's captured output.
    ///
    /// One-shot mode yields the current buffers once. Follow mode polls for
    /// growth until the task leaves `Running`, yielding only newly appended
    /// increments; stderr increments carry a `[stderr]` prefix.
    ///
    /// # Errors
    /// Returns [`ExecError::TaskNotFound`] for unknown ids.
    pub async fn stream_output(
        &self,
        id: &str,
        follow: bool,
    ) -> Result<BoxStream<'static, String>> {
        let task = self.get_task(id).await?;
        let stream = async_stream::stream! {
            // Positions are cumulative byte counts, not buffer offsets, so
            // tail truncation between polls cannot strand them inside the
            // retained content.
            let mut out_seen = 0u64;
            let mut err_seen = 0u64;
            loop {
                // Read the status before the buffers: a terminal status seen
                // here guarantees this round drains everything the readers
                // wrote.
                let terminal = task.status().is_terminal();
                let (stdout, stderr, out_total, err_total) = task.output_with_totals();

                if out_total > out_seen {
                    yield tail_increment(&stdout, out_total, out_seen);
                    out_seen = out_total;
                }
                if err_total > err_seen {
                    yield format!("[stderr] {}", tail_increment(&stderr, err_total, err_seen));
                    err_seen = err_total;
                }

                if !follow || terminal {
                    break;
                }
                tokio::time::sleep(FOLLOW_POLL_INTERVAL).await;
            }
        };
        Ok(stream.boxed())
    }

    /// Kill every running task. Called by the composing application on
    /// shutdown.
    pub async fn shutdown(&self) {
        let running: Vec<String> = {
            let tasks = self.tasks.read().await;
            tasks
                .values()
                .filter(|t| t.is_running())
                .map(|t| t.id().to_string())
                .collect()
        };
        for id in running {
            if let Err(e) = self.kill_task(&id).await {
                log::warn!("failed to kill task {id} during shutdown: {e}");
            }
        }
    }
}

impl Default for BackgroundTaskManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Listing order: running tasks first, newest (highest id) first within
/// each group.
fn snapshot_order(a: &TaskSnapshot, b: &TaskSnapshot) -> std::cmp::Ordering {
    let a_running = a.status == TaskStatus::Running;
    let b_running = b.status == TaskStatus::Running;
    b_running
        .cmp(&a_running)
        .then_with(|| numeric_id(&b.id).cmp(&numeric_id(&a.id)))
}

/// Ids are decimal counters; falling back to max keeps any malformed id at
/// the end of a descending sort.
fn numeric_id(id: &str) -> u64 {
    id.parse().unwrap_or(u64::MAX)
}

/// Slice the unseen tail out of a possibly truncated buffer.
///
/// `total` counts every byte ever appended to the stream; `seen` is the
/// follower's cumulative position. When truncation already dropped unseen
/// bytes, the whole retained buffer is the increment. Otherwise the slice
/// start coincides with a previous append boundary, so it is always a valid
/// char boundary.
fn tail_increment(buf: &str, total: u64, seen: u64) -> String {
    let unseen = usize::try_from(total - seen).unwrap_or(usize::MAX);
    if unseen >= buf.len() {
        buf.to_string()
    } else {
        buf[buf.len() - unseen..].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_task() -> BackgroundTask {
        BackgroundTask::new("1".into(), "true".into(), None, None).0
    }

    #[test]
    fn increments_are_exact_while_untruncated() {
        let task = bare_task();
        task.append_stdout("first");
        let (stdout, _, total, _) = task.output_with_totals();
        assert_eq!(tail_increment(&stdout, total, 0), "first\n");

        task.append_stdout("second");
        let (stdout, _, new_total, _) = task.output_with_totals();
        assert_eq!(tail_increment(&stdout, new_total, total), "second\n");
    }

    #[test]
    fn increment_after_truncation_stays_on_char_boundaries() {
        let task = bare_task();
        // A long single-byte line, fully observed by the follower.
        task.append_stdout(&"a".repeat(600_000));
        let (_, _, seen, _) = task.output_with_totals();

        // A multi-byte line big enough to trigger tail truncation; the
        // retained buffer is longer than the follower's old offset but holds
        // entirely different content.
        task.append_stdout(&"é".repeat(1_600_000));
        let (stdout, _, total, _) = task.output_with_totals();
        assert!(stdout.len() < total as usize);

        let inc = tail_increment(&stdout, total, seen);
        assert!(stdout.is_char_boundary(stdout.len() - inc.len()));
        // Unseen bytes were partly truncated away: the whole buffer is the
        // increment.
        assert_eq!(inc, stdout);

        // Follow-up appends resume exact incremental delivery.
        task.append_stdout("after");
        let (stdout, _, newer_total, _) = task.output_with_totals();
        assert_eq!(tail_increment(&stdout, newer_total, total), "after\n");
    }

    #[test]
    fn snapshot_sort_is_running_first_then_newest() {
        let snap = |id: &str, status| TaskSnapshot {
            id: id.to_string(),
            command: "true".to_string(),
            workdir: None,
            status,
            exit_code: None,
            started_at: chrono::Utc::now(),
            ended_at: None,
            stdout_bytes: 0,
            stderr_bytes: 0,
        };
        let mut snapshots = vec![
            snap("1", TaskStatus::Success),
            snap("2", TaskStatus::Running),
            snap("3", TaskStatus::Killed),
            snap("4", TaskStatus::Running),
        ];
        snapshots.sort_by(snapshot_order);
        let order: Vec<&str> = snapshots.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(order, ["4", "2", "3", "1"]);
    }
}
