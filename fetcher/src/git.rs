//! Git operations for the plugin index and plugin artifacts.
//!
//! Clones and pulls shell out to `git` with a bounded wait so that a stalled
//! network never hangs provisioning indefinitely.

use crate::error::{FetchError, Result};
use camino::Utf8Path;
use std::process::{Command, Output, Stdio};
use std::time::Duration;
use wait_timeout::ChildExt;

/// Default timeout for git operations (5 minutes).
const GIT_TIMEOUT: Duration = Duration::from_secs(300);

/// Clones and updates repositories.
#[cfg_attr(test, mockall::automock)]
pub trait GitClient {
    /// Clone `branch` of `url` into `target`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Git`] if the clone fails or times out.
    fn clone_repository(&self, url: &str, branch: &str, target: &Utf8Path) -> Result<()>;

    /// Pull the latest changes into the clone at `repo`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Git`] if the pull fails or times out.
    fn update_repository(&self, repo: &Utf8Path) -> Result<()>;
}

/// Runs the host's `git`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemGit;

impl GitClient for SystemGit {
    fn clone_repository(&self, url: &str, branch: &str, target: &Utf8Path) -> Result<()> {
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }

        log::info!("cloning {url} ({branch})");
        let output = run_git_with_timeout(
            &["clone", "--branch", branch, url, target.as_str()],
            None,
            "clone",
        )?;
        check_output(&output, "clone")
    }

    fn update_repository(&self, repo: &Utf8Path) -> Result<()> {
        log::info!("updating {repo}");
        let output = run_git_with_timeout(&["pull"], Some(repo), "pull")?;
        check_output(&output, "pull")
    }
}

fn check_output(output: &Output, operation: &'static str) -> Result<()> {
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(FetchError::Git {
        operation,
        message: stderr.trim().to_owned(),
    })
}

/// Runs a git command with a timeout.
///
/// Returns the command output if it completes within the timeout, or an error
/// if the command times out or fails to start.
fn run_git_with_timeout(
    args: &[&str],
    working_dir: Option<&Utf8Path>,
    operation: &'static str,
) -> Result<Output> {
    let mut cmd = Command::new("git");
    cmd.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());

    if let Some(dir) = working_dir {
        cmd.current_dir(dir.as_std_path());
    }

    let mut child = cmd.spawn()?;

    if let Some(status) = child.wait_timeout(GIT_TIMEOUT)? {
        let stdout = child
            .stdout
            .take()
            .map(std::io::read_to_string)
            .transpose()?
            .unwrap_or_default();
        let stderr = child
            .stderr
            .take()
            .map(std::io::read_to_string)
            .transpose()?
            .unwrap_or_default();

        return Ok(Output {
            status,
            stdout: stdout.into_bytes(),
            stderr: stderr.into_bytes(),
        });
    }

    if let Err(err) = child.kill() {
        log::debug!("killing timed-out git {operation} failed: {err}");
    }
    if let Err(err) = child.wait() {
        log::debug!("reaping timed-out git {operation} failed: {err}");
    }
    Err(FetchError::Git {
        operation,
        message: format!(
            "operation timed out after {} seconds",
            GIT_TIMEOUT.as_secs()
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{failure_output, success_output};

    #[test]
    fn successful_output_passes() {
        assert!(check_output(&success_output(), "clone").is_ok());
    }

    #[test]
    fn failure_carries_operation_and_stderr() {
        let err = check_output(&failure_output("fatal: repository not found\n"), "pull")
            .expect_err("failure");
        let msg = err.to_string();
        assert!(msg.contains("pull"));
        assert!(msg.contains("fatal: repository not found"));
        assert!(!msg.ends_with('\n'));
    }
}
