//! Running host commands.
//!
//! Every external tool the pipeline touches (`zfs`, `mount`, `kldload`,
//! `jexec`, the jail manager, the patch script) goes through
//! [`CommandExecutor`] so that tests can replay canned responses instead.

use crate::error::{FetchError, Result};
use std::process::{Command, Output};

/// Abstraction for running external commands.
pub trait CommandExecutor {
    /// Runs a command with arguments and returns the captured output.
    ///
    /// # Errors
    ///
    /// Returns any I/O errors encountered while spawning or running the command.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use cagefetch::command::{CommandExecutor, SystemCommandExecutor};
    ///
    /// let executor = SystemCommandExecutor;
    /// let output = executor.run("uname", &["-r"])?;
    /// assert!(output.status.success());
    /// # Ok::<(), cagefetch::error::FetchError>(())
    /// ```
    fn run(&self, cmd: &str, args: &[&str]) -> Result<Output>;

    /// Runs a command with extra environment variables set for the child only.
    ///
    /// # Errors
    ///
    /// Returns any I/O errors encountered while spawning or running the command.
    fn run_with_env(&self, cmd: &str, args: &[&str], env: &[(&str, &str)]) -> Result<Output>;
}

/// Executes commands on the host system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandExecutor;

impl CommandExecutor for SystemCommandExecutor {
    fn run(&self, cmd: &str, args: &[&str]) -> Result<Output> {
        self.run_with_env(cmd, args, &[])
    }

    fn run_with_env(&self, cmd: &str, args: &[&str], env: &[(&str, &str)]) -> Result<Output> {
        log::debug!("running {}", command_line(cmd, args));
        Command::new(cmd)
            .args(args)
            .envs(env.iter().copied())
            .output()
            .map_err(FetchError::from)
    }
}

/// Runs a command and turns a non-zero exit into [`FetchError::CommandFailed`].
///
/// # Errors
///
/// Returns the spawn error, or `CommandFailed` carrying the trimmed stderr.
pub fn run_checked(executor: &dyn CommandExecutor, cmd: &str, args: &[&str]) -> Result<Output> {
    let output = executor.run(cmd, args)?;
    ensure_success(cmd, args, output)
}

/// Converts an unsuccessful [`Output`] into [`FetchError::CommandFailed`].
///
/// # Errors
///
/// Returns `CommandFailed` when the exit status is non-zero.
pub fn ensure_success(cmd: &str, args: &[&str], output: Output) -> Result<Output> {
    if output.status.success() {
        return Ok(output);
    }
    Err(FetchError::CommandFailed {
        command: command_line(cmd, args),
        message: failure_message(&output),
    })
}

/// Best description of why a command failed: stderr, else stdout, else status.
#[must_use]
pub fn failure_message(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        return stderr.trim().to_owned();
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
        return stdout.trim().to_owned();
    }
    output.status.to_string()
}

/// Render a command and its arguments for messages.
#[must_use]
pub fn command_line(cmd: &str, args: &[&str]) -> String {
    std::iter::once(cmd)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}
