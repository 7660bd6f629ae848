//! Error types for the command execution subsystem

use std::time::Duration;
use thiserror::Error;

/// Main error type for command execution operations
#[derive(Error, Debug)]
pub enum ExecError {
    /// Platform shell binary could not be located
    #[error("Shell not found: {0}")]
    ShellNotFound(String),

    /// Shell session could not be started (process or pipe creation)
    #[error("Failed to start shell session: {0}")]
    SessionStart(String),

    /// Read or write against the session's streams failed mid-command.
    /// The session is torn down and rebuilt on the next call.
    #[error("Shell session I/O error: {0}")]
    SessionIo(String),

    /// The in-flight operation was cancelled by the caller's context
    #[error("Command interrupted: {0}")]
    Interrupted(String),

    /// Background task id has no entry in the registry
    #[error("Background task not found: {0}")]
    TaskNotFound(String),

    /// Operation requires a running task but the task already terminated
    #[error("Background task {0} is not running")]
    TaskNotRunning(String),

    /// Background task process could not be spawned
    #[error("Failed to spawn background task: {0}")]
    TaskSpawn(String),

    /// An approval request is already pending on this coordinator
    #[error("Approval coordinator busy: another approval request is pending")]
    ApprovalBusy,

    /// No approval response arrived before the configured deadline
    #[error("Approval request timed out after {0:?}")]
    ApprovalTimeout(Duration),

    /// The channel to or from the remote approver is gone
    #[error("Approval channel error: {0}")]
    ApprovalChannel(String),

    /// Background sub-syntax could not be parsed
    #[error("Invalid background command: {0}")]
    InvalidBackgroundCommand(String),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for command execution operations
pub type Result<T> = std::result::Result<T, ExecError>;

impl ExecError {
    /// Create a shell-not-found error
    pub fn shell_not_found(msg: impl Into<String>) -> Self {
        Self::ShellNotFound(msg.into())
    }

    /// Create a session start error
    pub fn session_start(msg: impl Into<String>) -> Self {
        Self::SessionStart(msg.into())
    }

    /// Create a session I/O error
    pub fn session_io(msg: impl Into<String>) -> Self {
        Self::SessionIo(msg.into())
    }

    /// Create an interrupted error
    pub fn interrupted(msg: impl Into<String>) -> Self {
        Self::Interrupted(msg.into())
    }

    /// Create a task-not-found error
    pub fn task_not_found(id: impl Into<String>) -> Self {
        Self::TaskNotFound(id.into())
    }

    /// Create a task-not-running error
    pub fn task_not_running(id: impl Into<String>) -> Self {
        Self::TaskNotRunning(id.into())
    }

    /// Create a task spawn error
    pub fn task_spawn(msg: impl Into<String>) -> Self {
        Self::TaskSpawn(msg.into())
    }

    /// Create an approval channel error
    pub fn approval_channel(msg: impl Into<String>) -> Self {
        Self::ApprovalChannel(msg.into())
    }

    /// Create an invalid background command error
    pub fn invalid_background_command(msg: impl Into<String>) -> Self {
        Self::InvalidBackgroundCommand(msg.into())
    }
}
