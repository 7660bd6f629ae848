//! POSIX process control: bash sessions and signal-based group kill

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::error::{ExecError, Result};

/// Locate the session shell binary.
///
/// Prefers `bash`, falling back to common install locations and finally to
/// plain `sh`.
pub fn shell_program() -> Result<PathBuf> {
    if let Ok(path) = which::which("bash") {
        return Ok(path);
    }

    // Manual search in common locations
    let locations = [
        PathBuf::from("/bin/bash"),
        PathBuf::from("/usr/bin/bash"),
        PathBuf::from("/usr/local/bin/bash"),
    ];
    for path in locations {
        if path.exists() && path.is_file() {
            return Ok(path);
        }
    }

    if let Ok(path) = which::which("sh") {
        return Ok(path);
    }
    let sh = PathBuf::from("/bin/sh");
    if sh.exists() {
        return Ok(sh);
    }

    Err(ExecError::shell_not_found(
        "neither bash nor sh found in PATH or common locations",
    ))
}

/// Build the command that spawns the persistent session shell.
///
/// The shell reads commands from stdin; all three streams are piped. The
/// process is placed in its own process group so the whole tree can be
/// killed on timeout or interrupt.
pub fn session_shell_command() -> Result<Command> {
    let shell = shell_program()?;
    let mut cmd = Command::new(shell);
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    cmd.process_group(0);
    Ok(cmd)
}

/// Build a one-shot `sh -c` style command for a detached background task.
pub fn spawn_one_shot_command(command: &str, workdir: Option<&Path>) -> Result<Command> {
    let shell = shell_program()?;
    let mut cmd = Command::new(shell);
    cmd.arg("-c").arg(command);
    if let Some(dir) = workdir {
        cmd.current_dir(dir);
    }
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    configure_detached(&mut cmd);
    Ok(cmd)
}

/// Detach a command into its own process group so it survives caller
/// cancellation and can be killed as a unit.
pub fn configure_detached(cmd: &mut Command) {
    cmd.process_group(0);
}

/// Compose the wrapped command line written to the session shell.
///
/// Without a workdir override the command runs at the session's top level,
/// so `cd`, `export`, and function definitions persist for later calls.
/// With an override, `cd` and command run inside a subshell grouping so the
/// override never relocates the session itself. Afterwards the sentinel
/// marker plus the command's exit code is emitted to stdout and the bare
/// marker to stderr; the leading newline on the stdout marker terminates any
/// partial last line of command output.
pub fn build_wrapped_command(
    command: &str,
    workdir: Option<&Path>,
    marker: &str,
) -> Result<String> {
    let body = match workdir {
        Some(dir) => {
            let dir = dir
                .to_str()
                .ok_or_else(|| ExecError::session_io("working directory is not valid UTF-8"))?;
            let quoted = shlex::try_quote(dir)
                .map_err(|_| ExecError::session_io("working directory cannot be shell-quoted"))?;
            format!("(cd {quoted} && ({command}))")
        }
        None => command.to_string(),
    };
    Ok(format!(
        "{body}\nprintf '\\n{marker}%s\\n' \"$?\"\nprintf '{marker}\\n' 1>&2\n"
    ))
}

/// Terminate a process and every descendant in its process group.
///
/// Sends SIGTERM first so well-behaved processes can clean up, then SIGKILL
/// after a short grace period. The child must have been spawned with
/// [`configure_detached`] (or [`session_shell_command`]) for the group kill
/// to reach grandchildren.
pub async fn kill_process_tree(pid: u32) {
    let pgid = pid as i32;
    unsafe {
        libc::killpg(pgid, libc::SIGTERM);
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    unsafe {
        libc::killpg(pgid, libc::SIGKILL);
    }
}
