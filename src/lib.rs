#![recursion_limit = "256"]

//! # Agent Shell
//!
//! Local command execution for AI agents. This library gives a tool-calling
//! loop a persistent shell session, a registry of detached background tasks,
//! and a human-approval gate for destructive commands, behind one facade.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use agent_shell::{ApprovalCoordinator, BackgroundTaskManager, CommandTool, ShellSessionManager};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (approval_tx, approval_rx) = mpsc::unbounded_channel();
//!     let tool = CommandTool::new(
//!         Arc::new(ShellSessionManager::new()),
//!         Arc::new(BackgroundTaskManager::new()),
//!         Arc::new(ApprovalCoordinator::new(approval_tx)),
//!     );
//!
//!     // The frontend drains `approval_rx` and answers via
//!     // `ApprovalCoordinator::handle_response`.
//!     let _ = approval_rx;
//!
//!     let output = tool.invoke("echo hello", None, false).await?;
//!     println!("{output}");
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`session`] — a single long-lived shell process; commands are framed
//!   with sentinel markers so output, exit code, and prompt state survive
//!   between calls (environment, working directory, shell functions persist).
//! - [`background`] — detached processes in their own process groups, with
//!   line-buffered output capture, watch-channel status, and tree kill.
//! - [`approval`] — a single-slot coordinator that parks dangerous
//!   invocations until a correlated human decision arrives or times out.
//! - [`tool`] — classification, the background sub-syntax, and the
//!   [`CommandTool`] facade the agent loop calls.

pub mod approval;
pub mod background;
pub mod error;
pub mod platform;
pub mod session;
pub mod tool;

pub use approval::{
    ApprovalCoordinator, ApprovalDecision, ApprovalRequestMessage, ApprovalResponseMessage,
    ApprovalTarget, DEFAULT_APPROVAL_TIMEOUT,
};
pub use background::{BackgroundTask, BackgroundTaskManager, TaskSnapshot, TaskStatus};
pub use error::{ExecError, Result};
pub use session::ShellSessionManager;
pub use tool::{BackgroundCommand, CommandTool, DangerClassifier, DEFAULT_COMMAND_TIMEOUT};

/// Library version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
