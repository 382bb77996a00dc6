//! Bringing a freshly extracted release up to its latest patch level.
//!
//! The upstream `freebsd-update.sh` is downloaded into a temporary
//! executable and run against the release root with `devfs` mounted and the
//! host's resolver configuration copied in. Cleanup runs whether or not
//! patching succeeded.

use crate::command::{CommandExecutor, ensure_success, failure_message, run_checked};
use crate::error::Result;
use crate::transport::http;
use cagefetch_common::Release;
use camino::{Utf8Path, Utf8PathBuf};
use std::path::Path;

/// Location of the patch tool.
pub const UPDATE_SCRIPT_URL: &str =
    "https://raw.githubusercontent.com/freebsd/freebsd/master/usr.sbin/freebsd-update/freebsd-update.sh";

/// Applies patches to an extracted release root.
#[cfg_attr(test, mockall::automock)]
pub trait Patcher {
    /// Patch the release extracted at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if setup or installing patches fails.
    fn patch(&self, release: &Release, root: &Utf8Path) -> Result<()>;
}

/// Supplies the patch tool script.
#[cfg_attr(test, mockall::automock)]
pub trait UpdateScriptSource {
    /// Write the script to `dest`.
    ///
    /// # Errors
    ///
    /// Returns an error if the script cannot be retrieved or written.
    fn fetch_to(&self, dest: &Path) -> Result<()>;
}

/// Downloads the script from [`UPDATE_SCRIPT_URL`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpUpdateScript;

impl UpdateScriptSource for HttpUpdateScript {
    fn fetch_to(&self, dest: &Path) -> Result<()> {
        let script = http::fetch_text(UPDATE_SCRIPT_URL)?;
        std::fs::write(dest, script)?;
        Ok(())
    }
}

/// Patches releases with `freebsd-update`.
pub struct FreebsdUpdatePatcher<'a> {
    executor: &'a dyn CommandExecutor,
    source: &'a dyn UpdateScriptSource,
    resolv_conf: Utf8PathBuf,
}

impl<'a> FreebsdUpdatePatcher<'a> {
    /// A patcher copying the host's `/etc/resolv.conf`.
    #[must_use]
    pub fn new(executor: &'a dyn CommandExecutor, source: &'a dyn UpdateScriptSource) -> Self {
        Self {
            executor,
            source,
            resolv_conf: Utf8PathBuf::from("/etc/resolv.conf"),
        }
    }

    /// Copy resolver configuration from `path` instead.
    #[must_use]
    pub fn with_resolv_conf(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.resolv_conf = path.into();
        self
    }

    fn run_update(&self, release: &Release, root: &Utf8Path) -> Result<()> {
        let config = root.join("etc/freebsd-update.conf");
        if !config.is_file() {
            log::info!("{release} has no freebsd-update.conf, skipping patches");
            return Ok(());
        }

        let script = tempfile::Builder::new()
            .prefix("freebsd-update")
            .suffix(".sh")
            .tempfile()?
            .into_temp_path();
        if let Err(err) = self.source.fetch_to(&script) {
            log::warn!("could not download freebsd-update for {release}: {err}");
            return Ok(());
        }
        make_executable(&script)?;
        let script_path = script.to_string_lossy().into_owned();

        let workdir = format!("{root}/var/db/freebsd-update/");
        let release_name = release.to_string();
        let env = [("UNAME_r", release_name.as_str()), ("PAGER", "/bin/cat")];
        let args = |step: &'static str| {
            [
                "-b",
                root.as_str(),
                "-d",
                workdir.as_str(),
                "-f",
                config.as_str(),
                "--not-running-from-cron",
                step,
            ]
        };

        log::info!("fetching patches for {release}");
        let fetched = self
            .executor
            .run_with_env(&script_path, &args("fetch"), &env)?;
        if !fetched.status.success() {
            log::warn!(
                "fetching patches for {release} failed: {}",
                failure_message(&fetched)
            );
            return Ok(());
        }

        log::info!("installing patches for {release}");
        let install = args("install");
        let installed = self.executor.run_with_env(&script_path, &install, &env)?;
        ensure_success(&script_path, &install, installed).map(drop)
    }

    fn cleanup(&self, root: &Utf8Path) -> Result<()> {
        let resolv = root.join("etc/resolv.conf");
        let removed = match std::fs::remove_file(&resolv) {
            Err(err) if err.kind() != std::io::ErrorKind::NotFound => {
                log::warn!("could not remove {resolv}: {err}");
                Err(err.into())
            }
            _ => Ok(()),
        };
        // devfs comes off even when the resolver copy lingers.
        let dev = root.join("dev");
        let unmounted = run_checked(self.executor, "umount", &[dev.as_str()]).map(drop);
        removed.and(unmounted)
    }
}

impl Patcher for FreebsdUpdatePatcher<'_> {
    fn patch(&self, release: &Release, root: &Utf8Path) -> Result<()> {
        let dev = root.join("dev");
        run_checked(self.executor, "mount", &["-t", "devfs", "devfs", dev.as_str()])?;

        let outcome = std::fs::copy(&self.resolv_conf, root.join("etc/resolv.conf"))
            .map_err(Into::into)
            .and_then(|_| self.run_update(release, root));
        let cleaned = self.cleanup(root);
        outcome.and(cleaned)
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
#[path = "patch_tests.rs"]
mod tests;
