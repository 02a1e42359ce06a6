//! External command execution.
//!
//! Every external tool snap drives (`docker`, `git`, `sqlcmd`) goes through
//! [`run_command`] so invocations are logged the same way and failures carry
//! the tool's stderr.

use std::io::Write;
use std::process::{Command, Stdio};

use tracing::debug;

use crate::error::{Result, SnapError};

/// Output from an external command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Raw standard output (may be binary, e.g. a tar stream).
    pub stdout: Vec<u8>,
    /// Standard error, lossily decoded.
    pub stderr: String,
    /// Exit code (None if terminated by signal).
    pub exit_code: Option<i32>,
    /// Whether the command exited successfully (exit code 0).
    pub success: bool,
}

impl CommandOutput {
    /// Standard output as trimmed text.
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).trim().to_string()
    }

    /// Check if the command succeeded and return an error if not.
    pub fn ensure_success(self, context: &str) -> Result<Self> {
        if self.success {
            Ok(self)
        } else {
            let code = self.exit_code.unwrap_or(-1);
            Err(SnapError::command(format!(
                "{} failed (exit code {}): {}",
                context,
                code,
                self.stderr.trim()
            )))
        }
    }
}

/// Run a command to completion, optionally feeding `stdin`.
///
/// A non-zero exit is NOT an error here; callers decide through
/// [`CommandOutput::ensure_success`]. Failing to spawn is an error.
pub fn run_command(cmd: &mut Command, stdin: Option<&[u8]>) -> Result<CommandOutput> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    let args: Vec<String> = cmd
        .get_args()
        .map(|a| a.to_string_lossy().into_owned())
        .collect();
    debug!("run_command: {} args={:?}", program, args);

    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });

    let mut child = cmd
        .spawn()
        .map_err(|e| SnapError::command(format!("Failed to spawn {}: {}", program, e)))?;

    // stdin is fed from a scoped thread so a child that writes before it
    // finishes reading cannot deadlock on a full stdout pipe.
    let pipe = child.stdin.take();
    let output = std::thread::scope(|scope| {
        if let (Some(input), Some(mut pipe)) = (stdin, pipe) {
            scope.spawn(move || {
                // Dropping the handle closes the pipe so the child sees EOF.
                if let Err(e) = pipe.write_all(input) {
                    debug!("stdin closed early: {}", e);
                }
            });
        }
        child.wait_with_output()
    })
    .map_err(|e| SnapError::command(format!("Failed waiting for {}: {}", program, e)))?;

    let exit_code = output.status.code();
    debug!("{} exited with {:?}", program, exit_code);

    Ok(CommandOutput {
        stdout: output.stdout,
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code,
        success: output.status.success(),
    })
}
