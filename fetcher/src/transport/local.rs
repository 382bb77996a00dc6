//! Local directory backend.
//!
//! Release files are copied from `<root>/<release>/<file>`. There is no
//! index to list, so the caller must name the release.

use super::{FetchOutcome, FileSet, ReleaseTransport, TransportError};
use cagefetch_common::Release;
use camino::{Utf8Path, Utf8PathBuf};

/// Backend name used in messages.
pub const BACKEND: &str = "local";

/// Copies release files out of a directory tree.
#[derive(Debug, Clone)]
pub struct LocalTransport {
    root: Utf8PathBuf,
}

impl LocalTransport {
    /// A backend reading from `root`.
    #[must_use]
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    /// Where `file` of `release` is expected.
    #[must_use]
    pub fn source_path(&self, release: &Release, file: &str) -> Utf8PathBuf {
        self.root.join(release.to_string()).join(file)
    }

    fn require(&self, release: &Release, file: &str) -> Result<Utf8PathBuf, TransportError> {
        let path = self.source_path(release, file);
        if path.is_file() {
            Ok(path)
        } else {
            Err(TransportError::MissingFile { path })
        }
    }
}

impl ReleaseTransport for LocalTransport {
    fn name(&self) -> &'static str {
        BACKEND
    }

    fn list_entries(&self) -> Result<Vec<String>, TransportError> {
        Err(TransportError::Unsupported {
            backend: BACKEND,
            operation: "listing releases",
        })
    }

    fn preflight(&self, release: &Release, files: &FileSet) -> Result<(), TransportError> {
        for file in files.files() {
            self.require(release, file)?;
        }
        Ok(())
    }

    fn fetch(
        &self,
        release: &Release,
        files: &[String],
        dest: &Utf8Path,
    ) -> Result<FetchOutcome, TransportError> {
        for file in files {
            let source = self.require(release, file)?;
            log::info!("copying {source}");
            std::fs::copy(&source, dest.join(file))?;
        }
        Ok(FetchOutcome::default())
    }
}
