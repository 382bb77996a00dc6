//! Checking downloaded files against the release manifest.

use crate::error::{FetchError, Result};
use crate::manifest::{Manifest, compute_sha256};
use crate::transport::{MANIFEST, ReleaseTransport};
use cagefetch_common::Release;
use camino::Utf8Path;
use std::fmt;

/// Why a file needs to be fetched again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileFault {
    /// The file is not on disk.
    Missing,
    /// The file's digest differs from the manifest.
    Mismatch {
        /// Digest listed in the manifest.
        expected: String,
        /// Digest of the file on disk.
        actual: String,
    },
    /// The manifest does not list the file.
    Unlisted,
}

impl fmt::Display for FileFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => f.write_str("is missing"),
            Self::Mismatch { expected, actual } => {
                write!(f, "has digest {actual}, expected {expected}")
            }
            Self::Unlisted => f.write_str("is not listed in MANIFEST"),
        }
    }
}

/// Which verification round is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyPass {
    /// After the first download; faults are collected for a refetch.
    Initial,
    /// After the refetch; any fault is fatal.
    Recheck,
}

/// Classify one file against the manifest.
///
/// # Errors
///
/// Returns an I/O error if the file exists but cannot be read.
pub fn check_file(manifest: &Manifest, dir: &Utf8Path, file: &str) -> Result<Option<FileFault>> {
    let path = dir.join(file);
    if !path.is_file() {
        return Ok(Some(FileFault::Missing));
    }
    let Some(expected) = manifest.digest_for(file) else {
        return Ok(Some(FileFault::Unlisted));
    };
    let actual = compute_sha256(&path)?;
    if &actual == expected {
        Ok(None)
    } else {
        Ok(Some(FileFault::Mismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }))
    }
}

/// Verify `archives` in `dir` and return those that must be fetched again.
///
/// A missing `MANIFEST` is fetched from `transport` first. Every archive is
/// hashed on every pass, including ones that verified earlier. On
/// [`VerifyPass::Recheck`] the first fault aborts the fetch.
///
/// # Errors
///
/// Returns [`FetchError::TooManyFailedVerifications`] on a recheck fault,
/// or any transport, manifest, or I/O error.
pub fn verify(
    transport: &dyn ReleaseTransport,
    release: &Release,
    archives: &[String],
    dir: &Utf8Path,
    pass: VerifyPass,
) -> Result<Vec<String>> {
    let manifest_path = dir.join(MANIFEST);
    if !manifest_path.is_file() {
        log::warn!("{MANIFEST} is missing, fetching it again");
        transport.fetch(release, &[MANIFEST.to_owned()], dir)?;
    }
    let manifest = Manifest::load(&manifest_path)?;

    let mut refetch = Vec::new();
    for file in archives.iter().filter(|file| *file != MANIFEST) {
        let Some(fault) = check_file(&manifest, dir, file)? else {
            log::debug!("{file} verified");
            continue;
        };
        if pass == VerifyPass::Recheck {
            return Err(FetchError::TooManyFailedVerifications {
                file: file.clone(),
                fault,
            });
        }
        match fault {
            FileFault::Missing => log::warn!("{file} missing, will try to redownload"),
            _ => log::warn!("{file} failed verification, will redownload"),
        }
        refetch.push(file.clone());
    }
    Ok(refetch)
}
