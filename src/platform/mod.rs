//! Platform-specific process control
//!
//! Everything that differs between operating systems lives here, behind a
//! small capability surface:
//!
//! - how the interactive session shell is located and spawned
//! - how a wrapped command line is composed (directory change + sentinel
//!   marker emission in the shell's own syntax)
//! - how the per-invocation sentinel marker is generated
//! - how a process and all of its descendants are terminated as a unit
//!
//! The active implementation is selected at compile time with `#[cfg]`
//! dispatch; callers only ever see the functions re-exported below.

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use unix::{
    build_wrapped_command, configure_detached, kill_process_tree, session_shell_command,
    shell_program, spawn_one_shot_command,
};

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::{
    build_wrapped_command, configure_detached, kill_process_tree, session_shell_command,
    shell_program, spawn_one_shot_command,
};

use chrono::Utc;

/// Generate a fresh sentinel marker for one command invocation.
///
/// The marker is derived from a high-resolution timestamp so it cannot
/// collide with real command output. Session commands are serialized by the
/// session mutex, so two consecutive invocations always observe different
/// timestamps.
#[must_use]
pub fn generate_marker() -> String {
    format!("__AGENT_SHELL_DONE_{}__", Utc::now().timestamp_micros())
}

/// Name of the persistent session shell used on this platform.
#[must_use]
pub fn session_shell_kind() -> &'static str {
    if cfg!(windows) { "cmd" } else { "bash" }
}
