//! Backing datasets for downloads, releases, and jails.
//!
//! Datasets are reached through [`DatasetStore`], an explicitly constructed
//! handle scoped to one fetch or provisioning run. [`ZfsStore`] drives the
//! `zfs` command; [`DirectoryStore`] uses plain directories and backs tests
//! and hosts without ZFS.

use crate::command::{CommandExecutor, run_checked};
use crate::error::{FetchError, Result};
use cagefetch_common::Release;
use camino::{Utf8Path, Utf8PathBuf};

/// Compression property for download datasets.
pub const DOWNLOAD_COMPRESSION: &str = "lz4";

/// Naming of the dataset tree under `<pool>/iocage`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetLayout {
    pool: String,
    iocroot: Utf8PathBuf,
}

impl DatasetLayout {
    /// Layout for `pool` mounted at `iocroot`.
    #[must_use]
    pub fn new(pool: impl Into<String>, iocroot: impl Into<Utf8PathBuf>) -> Self {
        Self {
            pool: pool.into(),
            iocroot: iocroot.into(),
        }
    }

    /// Mountpoint of the `iocage` dataset.
    #[must_use]
    pub fn iocroot(&self) -> &Utf8Path {
        &self.iocroot
    }

    /// `<pool>/iocage/download/<release>`.
    #[must_use]
    pub fn download_dataset(&self, release: &Release) -> String {
        format!("{}/iocage/download/{release}", self.pool)
    }

    /// Where downloaded files for `release` live.
    #[must_use]
    pub fn download_dir(&self, release: &Release) -> Utf8PathBuf {
        self.iocroot.join("download").join(release.to_string())
    }

    /// `<pool>/iocage/releases/<release>/root`.
    #[must_use]
    pub fn release_dataset(&self, release: &Release) -> String {
        format!("{}/iocage/releases/{release}/root", self.pool)
    }

    /// `<iocroot>/releases/<release>`.
    #[must_use]
    pub fn release_dir(&self, release: &Release) -> Utf8PathBuf {
        self.iocroot.join("releases").join(release.to_string())
    }

    /// Where `release` is extracted.
    #[must_use]
    pub fn release_root(&self, release: &Release) -> Utf8PathBuf {
        self.release_dir(release).join("root")
    }

    /// `<pool>/iocage/jails/<name>`.
    #[must_use]
    pub fn jail_dataset(&self, name: &str) -> String {
        format!("{}/iocage/jails/{name}", self.pool)
    }

    /// `<iocroot>/jails/<name>`.
    #[must_use]
    pub fn jail_dir(&self, name: &str) -> Utf8PathBuf {
        self.iocroot.join("jails").join(name)
    }

    /// Clone of the plugin index repository.
    #[must_use]
    pub fn plugin_index_dir(&self) -> Utf8PathBuf {
        self.iocroot.join(".plugin_index")
    }
}

/// Creates and mounts datasets.
#[cfg_attr(test, mockall::automock)]
pub trait DatasetStore {
    /// Whether a dataset is already mounted at `mountpoint`.
    fn exists(&self, mountpoint: &Utf8Path) -> bool;

    /// Create `dataset` (and missing parents) mounted at `mountpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Dataset`] if creation fails.
    fn create(&self, dataset: &str, mountpoint: &Utf8Path, compression: &str) -> Result<()>;

    /// Mount `dataset`, and with `recursive` every child below it.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Dataset`] if a mount fails.
    fn mount(&self, dataset: &str, recursive: bool) -> Result<()>;
}

/// Datasets managed with the `zfs` command.
pub struct ZfsStore<'a> {
    executor: &'a dyn CommandExecutor,
}

impl<'a> ZfsStore<'a> {
    /// A store running `zfs` through `executor`.
    #[must_use]
    pub fn new(executor: &'a dyn CommandExecutor) -> Self {
        Self { executor }
    }

    fn is_mounted(&self, dataset: &str) -> Result<bool> {
        let output = run_checked(
            self.executor,
            "zfs",
            &["get", "-H", "-o", "value", "mounted", dataset],
        )?;
        Ok(String::from_utf8_lossy(&output.stdout).trim() == "yes")
    }
}

impl DatasetStore for ZfsStore<'_> {
    fn exists(&self, mountpoint: &Utf8Path) -> bool {
        mountpoint.is_dir()
    }

    fn create(&self, dataset: &str, mountpoint: &Utf8Path, compression: &str) -> Result<()> {
        log::info!("creating dataset {dataset}");
        let compression = format!("compression={compression}");
        let mountpoint = format!("mountpoint={mountpoint}");
        run_checked(
            self.executor,
            "zfs",
            &["create", "-p", "-o", &compression, "-o", &mountpoint, dataset],
        )
        .map(drop)
        .map_err(|err| FetchError::Dataset {
            dataset: dataset.to_owned(),
            reason: err.to_string(),
        })
    }

    fn mount(&self, dataset: &str, recursive: bool) -> Result<()> {
        let datasets = if recursive {
            let output = run_checked(
                self.executor,
                "zfs",
                &["list", "-H", "-o", "name", "-r", dataset],
            )?;
            String::from_utf8_lossy(&output.stdout)
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_owned)
                .collect()
        } else {
            vec![dataset.to_owned()]
        };

        for name in &datasets {
            if self.is_mounted(name)? {
                continue;
            }
            log::debug!("mounting {name}");
            run_checked(self.executor, "zfs", &["mount", name]).map_err(|err| {
                FetchError::Dataset {
                    dataset: name.clone(),
                    reason: err.to_string(),
                }
            })?;
        }
        Ok(())
    }
}

/// Datasets as plain directories.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryStore;

impl DatasetStore for DirectoryStore {
    fn exists(&self, mountpoint: &Utf8Path) -> bool {
        mountpoint.is_dir()
    }

    fn create(&self, dataset: &str, mountpoint: &Utf8Path, _compression: &str) -> Result<()> {
        std::fs::create_dir_all(mountpoint).map_err(|err| FetchError::Dataset {
            dataset: dataset.to_owned(),
            reason: err.to_string(),
        })
    }

    fn mount(&self, _dataset: &str, _recursive: bool) -> Result<()> {
        Ok(())
    }
}
