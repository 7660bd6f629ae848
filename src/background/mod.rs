//! Detached command execution
//!
//! Long-running commands (dev servers, watchers, builds) run here instead of
//! blocking the persistent shell session. Each task is a detached process in
//! its own process group with line-buffered output capture and a watch-based
//! status channel.

mod manager;
mod task;

pub use manager::BackgroundTaskManager;
pub use task::{BackgroundTask, TaskSnapshot, TaskStatus};
