//! Command tool facade
//!
//! The single entry point the agent's tool-calling loop invokes. Routing:
//! background sub-syntax goes to the task registry, dangerous commands pause
//! on the approval coordinator, everything else runs in the persistent shell
//! session.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use super::background_cmd::BackgroundCommand;
use super::danger::DangerClassifier;
use crate::approval::{ApprovalCoordinator, ApprovalTarget};
use crate::background::{BackgroundTaskManager, TaskSnapshot};
use crate::error::Result;
use crate::session::ShellSessionManager;

/// Default wall-clock limit for a foreground command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

/// Longest command excerpt shown to the approver.
const DETAILS_MAX_CHARS: usize = 120;

/// Facade over session execution, background tasks, and approval gating.
pub struct CommandTool {
    sessions: Arc<ShellSessionManager>,
    tasks: Arc<BackgroundTaskManager>,
    approvals: Arc<ApprovalCoordinator>,
    classifier: DangerClassifier,
    default_timeout: Duration,
}

impl CommandTool {
    #[must_use]
    pub fn new(
        sessions: Arc<ShellSessionManager>,
        tasks: Arc<BackgroundTaskManager>,
        approvals: Arc<ApprovalCoordinator>,
    ) -> Self {
        Self {
            sessions,
            tasks,
            approvals,
            classifier: DangerClassifier::new(),
            default_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Run one tool invocation and return its textual result.
    ///
    /// With `background` set, `command` is parsed as the background
    /// sub-syntax. Otherwise the command is classified and either executed
    /// in the persistent session or routed through the approval gate first.
    /// A human rejection is an ordinary result, not an error.
    ///
    /// # Errors
    /// Propagates execution, parse, and approval-plumbing failures.
    pub async fn invoke(
        &self,
        command: &str,
        workdir: Option<&Path>,
        background: bool,
    ) -> Result<String> {
        self.invoke_with_timeout(command, workdir, background, self.default_timeout)
            .await
    }

    /// [`invoke`](Self::invoke) with an explicit foreground timeout.
    ///
    /// # Errors
    /// Propagates execution, parse, and approval-plumbing failures.
    pub async fn invoke_with_timeout(
        &self,
        command: &str,
        workdir: Option<&Path>,
        background: bool,
        timeout: Duration,
    ) -> Result<String> {
        if background {
            let parsed = BackgroundCommand::parse(command)?;
            return self.dispatch_background(parsed, workdir).await;
        }

        if self.classifier.is_dangerous(command) {
            if let Some(rejection) = self.gate_on_approval(command).await? {
                return Ok(rejection);
            }
        }

        self.sessions.execute(command, workdir, timeout).await
    }

    /// Ask the human; `None` means approved, `Some(text)` is the rejection
    /// message to hand back to the caller.
    async fn gate_on_approval(&self, command: &str) -> Result<Option<String>> {
        let target_id = Uuid::new_v4().to_string();
        let target = ApprovalTarget {
            id: target_id.clone(),
            tool: "execute_command".to_string(),
            details: truncate_chars(command, DETAILS_MAX_CHARS),
        };

        log::info!("dangerous command, requesting approval: {}", target.details);
        let results = self.approvals.request_approval(vec![target]).await?;

        let decision = results.get(&target_id);
        if decision.is_some_and(|d| d.approved) {
            return Ok(None);
        }
        let reason = decision
            .and_then(|d| d.reason.as_deref())
            .unwrap_or("no reason given");
        Ok(Some(format!(
            "Command was not approved by the user. Reason: {reason}. \
             The command was not executed."
        )))
    }

    async fn dispatch_background(
        &self,
        cmd: BackgroundCommand,
        workdir: Option<&Path>,
    ) -> Result<String> {
        match cmd {
            BackgroundCommand::Start(command) => {
                let task = self.tasks.start_task(&command, workdir).await?;
                Ok(format!(
                    "Started background task {} (pid {}): {}",
                    task.id(),
                    task.pid().map_or_else(|| "?".to_string(), |p| p.to_string()),
                    task.command()
                ))
            }
            BackgroundCommand::List => {
                let tasks = self.tasks.list_tasks().await;
                if tasks.is_empty() {
                    return Ok("No background tasks.".to_string());
                }
                let mut out = String::from("ID  STATUS   COMMAND\n");
                for snap in &tasks {
                    out.push_str(&format!(
                        "{:<3} {:<8} {}\n",
                        snap.id, snap.status, snap.command
                    ));
                }
                Ok(out)
            }
            BackgroundCommand::Show(id) => {
                let task = self.tasks.get_task(&id).await?;
                Ok(render_snapshot(&task.snapshot()))
            }
            BackgroundCommand::Output(id) => {
                let task = self.tasks.get_task(&id).await?;
                let (stdout, stderr) = task.output();
                let mut out = stdout;
                if !stderr.is_empty() {
                    if !out.is_empty() {
                        out.push('\n');
                    }
                    out.push_str("STDERR:\n");
                    out.push_str(&stderr);
                }
                if out.is_empty() {
                    out.push_str("(no output)");
                }
                Ok(out)
            }
            BackgroundCommand::Remove(id) => {
                let was_running = self.tasks.get_task(&id).await?.is_running();
                let snap = self.tasks.remove_task(&id).await?;
                if was_running {
                    Ok(format!("Killed and removed task {} ({})", snap.id, snap.command))
                } else {
                    Ok(format!("Removed task {} ({})", snap.id, snap.command))
                }
            }
        }
    }
}

fn render_snapshot(snap: &TaskSnapshot) -> String {
    let mut out = format!(
        "Task {}\n  command: {}\n  status: {}\n  started: {}\n",
        snap.id, snap.command, snap.status, snap.started_at
    );
    if let Some(dir) = &snap.workdir {
        out.push_str(&format!("  workdir: {dir}\n"));
    }
    if let Some(ended) = &snap.ended_at {
        out.push_str(&format!("  ended: {ended}\n"));
    }
    if let Some(code) = snap.exit_code {
        out.push_str(&format!("  exit code: {code}\n"));
    }
    out.push_str(&format!(
        "  output: {} bytes stdout, {} bytes stderr\n",
        snap.stdout_bytes, snap.stderr_bytes
    ));
    out
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let cut: String = s.chars().take(max).collect();
    format!("{cut}…")
}
