//! Executes an accepted command through the user's shell.
//!
//! Commands run as `$SHELL -c <command>` with inherited stdio, so pipes,
//! globs, and interactive programs behave exactly as if the user had typed
//! the line themselves.

use crate::error::CognateError;
use anyhow::Result;
use std::process::{Command, ExitStatus};
use tracing::info;

/// Trait for launching shell commands.
///
/// This abstraction enables testing without spawning real processes.
pub trait ShellRunner: Send + Sync {
    /// Runs `command` under `shell -c` and returns the exit code.
    fn run(&self, shell: &str, command: &str) -> Result<i32>;
}

/// Default runner using std::process::Command with inherited stdio.
pub struct SystemShellRunner;

impl ShellRunner for SystemShellRunner {
    fn run(&self, shell: &str, command: &str) -> Result<i32> {
        let status = Command::new(shell).arg("-c").arg(command).status()?;
        Ok(exit_code(status))
    }
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    // Shell convention for signal-terminated children.
    status
        .code()
        .unwrap_or_else(|| 128 + status.signal().unwrap_or(0))
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}

/// The shell to hand commands to: `$SHELL`, or `/bin/sh` when unset.
pub fn resolve_shell() -> String {
    std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string())
}

/// Executes accepted commands through a shell.
pub struct CommandExecutor;

impl CommandExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Run `command` and return its exit code. A failing command is not an
    /// error here; the caller decides what the code means.
    pub fn execute(&self, command: &str) -> Result<i32, CognateError> {
        self.execute_with_runner(command, &SystemShellRunner)
    }

    /// Runs a command with an injected runner (for testing).
    pub fn execute_with_runner(
        &self,
        command: &str,
        runner: &impl ShellRunner,
    ) -> Result<i32, CognateError> {
        let shell = resolve_shell();
        info!(%shell, %command, "executing command");
        runner.run(&shell, command).map_err(CognateError::General)
    }
}

impl Default for CommandExecutor {
    fn default() -> Self {
        Self::new()
    }
}
