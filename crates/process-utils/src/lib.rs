//! Helpers for spawning the external tools the engine shells out to.
//!
//! Every child spawned through [`tokio_command`] is killed when its handle is
//! dropped, so abandoning a call (timeout, cancellation) never leaks a process.

use std::ffi::OsStr;
use std::fmt;
use std::process::{Output, Stdio};
use std::time::Duration;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Apply the Windows `CREATE_NO_WINDOW` flag to child processes.
///
/// On non-Windows targets this is a no-op.
pub trait NoWindowExt {
    fn no_window(&mut self);
}

impl NoWindowExt for std::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.creation_flags(CREATE_NO_WINDOW);
        }
    }
}

/// Create a `std::process::Command` with `CREATE_NO_WINDOW` applied on Windows.
pub fn std_command(program: impl AsRef<OsStr>) -> std::process::Command {
    let mut cmd = std::process::Command::new(program);
    cmd.no_window();
    cmd
}

#[cfg(feature = "tokio")]
impl NoWindowExt for tokio::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
    }
}

/// Create a `tokio::process::Command` for a short-lived tool invocation.
///
/// stdin is closed, stdout/stderr are piped and the child is killed on drop.
#[cfg(feature = "tokio")]
pub fn tokio_command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.no_window();
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

/// Failure of a bounded tool invocation.
#[derive(Debug)]
pub enum RunError {
    /// The program could not be started.
    Spawn(std::io::Error),
    /// The program did not finish within the allotted time and was killed.
    TimedOut(Duration),
    /// Collecting the program output failed.
    Io(std::io::Error),
}

impl RunError {
    /// Whether the failure means the program is not installed.
    pub fn is_missing_program(&self) -> bool {
        matches!(self, RunError::Spawn(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::Spawn(e) => write!(f, "failed to spawn process: {e}"),
            RunError::TimedOut(d) => write!(f, "process timed out after {d:?}"),
            RunError::Io(e) => write!(f, "failed to collect process output: {e}"),
        }
    }
}

impl std::error::Error for RunError {}

/// Run a command to completion, killing it if it exceeds `timeout`.
///
/// The child is owned by the returned future; when the deadline passes the
/// future is dropped and `kill_on_drop` reaps the process.
#[cfg(feature = "tokio")]
pub async fn output_with_timeout(
    mut cmd: tokio::process::Command,
    timeout: Duration,
) -> Result<Output, RunError> {
    cmd.kill_on_drop(true);
    let child = cmd.spawn().map_err(RunError::Spawn)?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(RunError::Io(e)),
        Err(_) => Err(RunError::TimedOut(timeout)),
    }
}

/// Lossy, trimmed UTF-8 view of a process stream.
pub fn lossy_trimmed(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_string()
}
