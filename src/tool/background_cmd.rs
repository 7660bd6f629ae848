//! Background sub-syntax
//!
//! The tool reserves a small text protocol for managing background tasks:
//! `start <cmd>`, `list`/`ls`, `show <id>`, `output <id>`/`logs <id>`, and
//! `remove <id>` with the aliases `rm`, `kill`, `stop`.

use crate::error::{ExecError, Result};

/// A parsed background management command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackgroundCommand {
    /// Start a new detached task running the given command text.
    Start(String),
    /// List all tracked tasks.
    List,
    /// Show one task's metadata.
    Show(String),
    /// Dump one task's captured output.
    Output(String),
    /// Kill (if running) and forget one task.
    Remove(String),
}

impl BackgroundCommand {
    /// Parse the reserved sub-syntax.
    ///
    /// # Errors
    /// Returns [`ExecError::InvalidBackgroundCommand`] for unknown verbs or
    /// missing arguments.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let mut parts = input.splitn(2, char::is_whitespace);
        let verb = parts.next().unwrap_or("");
        let rest = parts.next().map(str::trim).unwrap_or("");

        match verb {
            "start" => {
                if rest.is_empty() {
                    return Err(ExecError::invalid_background_command(
                        "start requires a command, e.g. `start npm run dev`",
                    ));
                }
                Ok(Self::Start(rest.to_string()))
            }
            "list" | "ls" => Ok(Self::List),
            "show" => Self::with_id(rest, Self::Show, "show"),
            "output" | "logs" => Self::with_id(rest, Self::Output, verb),
            "remove" | "rm" | "kill" | "stop" => Self::with_id(rest, Self::Remove, verb),
            "" => Err(ExecError::invalid_background_command(
                "empty background command",
            )),
            other => Err(ExecError::invalid_background_command(format!(
                "unknown verb `{other}`, expected start/list/show/output/remove"
            ))),
        }
    }

    fn with_id(rest: &str, ctor: fn(String) -> Self, verb: &str) -> Result<Self> {
        if rest.is_empty() || rest.contains(char::is_whitespace) {
            return Err(ExecError::invalid_background_command(format!(
                "{verb} requires a single task id"
            )));
        }
        Ok(ctor(rest.to_string()))
    }
}
