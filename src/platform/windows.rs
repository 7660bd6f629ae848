//! Windows process control: cmd.exe sessions and job-style tree kill
//!
//! The persistent session runs over `cmd.exe` reading commands from stdin;
//! `%errorlevel%` stands in for `$?` and `taskkill /T` terminates the whole
//! descendant tree, which Windows does not do on plain process kill.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::error::{ExecError, Result};

const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

/// Locate the session shell binary (`cmd.exe`).
pub fn shell_program() -> Result<PathBuf> {
    if let Ok(path) = which::which("cmd.exe") {
        return Ok(path);
    }
    if let Ok(root) = std::env::var("SystemRoot") {
        let path = PathBuf::from(root).join("System32").join("cmd.exe");
        if path.exists() {
            return Ok(path);
        }
    }
    Err(ExecError::shell_not_found(
        "cmd.exe not found in PATH or %SystemRoot%\\System32",
    ))
}

/// Build the command that spawns the persistent session shell.
///
/// `/Q` turns command echo off so captured output stays close to what the
/// user command actually printed.
pub fn session_shell_command() -> Result<Command> {
    let shell = shell_program()?;
    let mut cmd = Command::new(shell);
    cmd.arg("/Q");
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
    Ok(cmd)
}

/// Build a one-shot `cmd /C` command for a detached background task.
pub fn spawn_one_shot_command(command: &str, workdir: Option<&Path>) -> Result<Command> {
    let shell = shell_program()?;
    let mut cmd = Command::new(shell);
    cmd.arg("/Q").arg("/C").arg(command);
    if let Some(dir) = workdir {
        cmd.current_dir(dir);
    }
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    configure_detached(&mut cmd);
    Ok(cmd)
}

/// Detach a command into its own console process group.
pub fn configure_detached(cmd: &mut Command) {
    cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
}

/// Compose the wrapped command line written to the session shell.
///
/// Without a workdir override the command runs directly, so `cd` and `set`
/// persist for later calls. With an override, `pushd`/`popd` bracket the
/// command so the override never relocates the session; the errorlevel is
/// echoed before `popd` runs.
pub fn build_wrapped_command(
    command: &str,
    workdir: Option<&Path>,
    marker: &str,
) -> Result<String> {
    match workdir {
        Some(dir) => {
            let dir = dir
                .to_str()
                .ok_or_else(|| ExecError::session_io("working directory is not valid UTF-8"))?;
            Ok(format!(
                "pushd \"{dir}\" && ({command})\r\necho.\r\necho {marker}%errorlevel%\r\npopd\r\necho {marker} 1>&2\r\n"
            ))
        }
        None => Ok(format!(
            "{command}\r\necho.\r\necho {marker}%errorlevel%\r\necho {marker} 1>&2\r\n"
        )),
    }
}

/// Terminate a process and every descendant via `taskkill /T /F`.
pub async fn kill_process_tree(pid: u32) {
    let result = Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .output()
        .await;
    if let Err(e) = result {
        log::warn!("taskkill for pid {pid} failed: {e}");
    }
}
