//! Shared test utilities for the fetcher crate.

use crate::command::CommandExecutor;
use crate::error::{FetchError, Result};
use sha2::{Digest, Sha256};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::Write;
use std::path::Path;
use std::process::{ExitStatus, Output};

/// Creates an `ExitStatus` from an exit code (Unix implementation).
#[cfg(unix)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;

    ExitStatus::from_raw(code << 8)
}

/// Creates an `ExitStatus` from an exit code (Windows implementation).
#[cfg(windows)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;

    ExitStatus::from_raw(code as u32)
}

/// Creates a successful command `Output` with empty stdout and stderr.
#[must_use]
pub fn success_output() -> Output {
    stdout_output("")
}

/// Creates a successful command `Output` with the given stdout.
#[must_use]
pub fn stdout_output(stdout: &str) -> Output {
    Output {
        status: exit_status(0),
        stdout: stdout.as_bytes().to_vec(),
        stderr: Vec::new(),
    }
}

/// Creates a failed command `Output` with the given stderr message.
#[must_use]
pub fn failure_output(stderr: &str) -> Output {
    Output {
        status: exit_status(1),
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

/// Represents an expected command invocation for testing.
#[derive(Debug)]
pub struct ExpectedCall {
    /// The command to execute (e.g., "zfs").
    pub cmd: String,
    /// The arguments to pass to the command.
    pub args: Vec<String>,
    /// The result to return when this command is invoked.
    pub result: Result<Output>,
    /// Match any command ending with `cmd`, for temporary script paths.
    pub suffix_only: bool,
}

impl ExpectedCall {
    /// Build an expectation from borrowed command and arguments.
    #[must_use]
    pub fn new(cmd: &str, args: &[&str], result: Result<Output>) -> Self {
        Self {
            cmd: cmd.to_owned(),
            args: args.iter().map(|arg| (*arg).to_owned()).collect(),
            result,
            suffix_only: false,
        }
    }

    /// Like [`ExpectedCall::new`], matching any command path ending in `suffix`.
    #[must_use]
    pub fn ending_with(suffix: &str, args: &[&str], result: Result<Output>) -> Self {
        Self {
            suffix_only: true,
            ..Self::new(suffix, args, result)
        }
    }

    fn matches(&self, cmd: &str, args: &[&str]) -> bool {
        let cmd_matches = if self.suffix_only {
            cmd.ends_with(&self.cmd)
        } else {
            self.cmd == cmd
        };
        cmd_matches && self.args.iter().map(String::as_str).eq(args.iter().copied())
    }
}

/// A stub implementation of `CommandExecutor` for testing.
///
/// Replays expected invocations in order and records the environment passed
/// to each `run_with_env` call.
#[derive(Debug, Default)]
pub struct StubExecutor {
    expected: RefCell<VecDeque<ExpectedCall>>,
    environments: RefCell<Vec<Vec<(String, String)>>>,
}

impl StubExecutor {
    /// Creates a new `StubExecutor` with the given expected calls.
    #[must_use]
    pub fn new(expected: Vec<ExpectedCall>) -> Self {
        Self {
            expected: RefCell::new(expected.into()),
            environments: RefCell::new(Vec::new()),
        }
    }

    /// Environments passed to `run_with_env`, in call order.
    #[must_use]
    pub fn environments(&self) -> Vec<Vec<(String, String)>> {
        self.environments.borrow().clone()
    }

    /// Asserts that all expected command invocations have been consumed.
    ///
    /// # Panics
    ///
    /// Panics if there are remaining expected calls that were not invoked.
    pub fn assert_finished(&self) {
        let remaining = self.expected.borrow();
        assert!(
            remaining.is_empty(),
            "expected no further command invocations, {} left: {:?}",
            remaining.len(),
            remaining.iter().map(|call| &call.cmd).collect::<Vec<_>>()
        );
    }
}

impl CommandExecutor for StubExecutor {
    fn run(&self, cmd: &str, args: &[&str]) -> Result<Output> {
        let mut expected = self.expected.borrow_mut();
        let Some(call) = expected.pop_front() else {
            return Err(FetchError::StubMismatch {
                message: format!("unexpected invocation of {cmd} {args:?}"),
            });
        };

        if !call.matches(cmd, args) {
            return Err(FetchError::StubMismatch {
                message: format!(
                    "expected {} {:?}, got {cmd} {args:?}",
                    call.cmd, call.args
                ),
            });
        }

        call.result
    }

    fn run_with_env(&self, cmd: &str, args: &[&str], env: &[(&str, &str)]) -> Result<Output> {
        self.environments.borrow_mut().push(
            env.iter()
                .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
                .collect(),
        );
        self.run(cmd, args)
    }
}

/// Hex SHA-256 of a byte slice.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Render a release `MANIFEST` listing each `(file, contents)` pair.
#[must_use]
pub fn manifest_for(files: &[(&str, &[u8])]) -> String {
    files
        .iter()
        .map(|(name, body)| {
            format!(
                "{name}\t{}\t1\t{}\t\"fixture\"\ton\n",
                sha256_hex(body),
                name.trim_end_matches(".txz")
            )
        })
        .collect()
}

/// One member of a fixture archive.
#[derive(Debug, Clone, Copy)]
pub enum Member<'a> {
    /// A directory entry.
    Dir(&'a str),
    /// A regular file with contents.
    File(&'a str, &'a [u8]),
    /// A symbolic link and its target.
    Symlink(&'a str, &'a str),
}

/// Write an xz-compressed tar archive at `path`.
///
/// Member names are written verbatim, so fixtures may contain `..` or
/// absolute names that the `tar` builder would otherwise refuse.
///
/// # Errors
///
/// Returns any I/O error from writing the archive.
pub fn write_txz(path: &Path, members: &[Member<'_>]) -> std::io::Result<()> {
    let file = std::fs::File::create(path)?;
    let encoder = xz2::write::XzEncoder::new(file, 6);
    let mut builder = tar::Builder::new(encoder);

    for member in members {
        let (name, kind, body, link): (&str, tar::EntryType, &[u8], Option<&str>) = match member {
            Member::Dir(name) => (*name, tar::EntryType::Directory, &[], None),
            Member::File(name, body) => (*name, tar::EntryType::Regular, *body, None),
            Member::Symlink(name, target) => {
                (*name, tar::EntryType::Symlink, &[], Some(*target))
            }
        };
        let mut header = tar::Header::new_gnu();
        set_raw_name(&mut header, name)?;
        header.set_entry_type(kind);
        header.set_size(body.len() as u64);
        header.set_mode(if kind.is_dir() { 0o755 } else { 0o644 });
        header.set_mtime(0);
        if let Some(target) = link {
            header.set_link_name(target)?;
        }
        header.set_cksum();
        builder.append(&header, body)?;
    }

    let mut encoder = builder.into_inner()?;
    encoder.flush()?;
    encoder.finish()?;
    Ok(())
}

fn set_raw_name(header: &mut tar::Header, name: &str) -> std::io::Result<()> {
    let gnu = header
        .as_gnu_mut()
        .ok_or_else(|| std::io::Error::other("not a GNU header"))?;
    let bytes = name.as_bytes();
    let slot = gnu
        .name
        .get_mut(..bytes.len())
        .ok_or_else(|| std::io::Error::other(format!("member name too long: {name}")))?;
    slot.copy_from_slice(bytes);
    Ok(())
}
