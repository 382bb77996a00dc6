//! Transport backends that list releases and retrieve release files.
//!
//! Three interchangeable backends implement [`ReleaseTransport`]:
//!
//! - [`local`] copies files out of a directory tree,
//! - [`ftp`] retrieves them from an FTP mirror,
//! - [`http`] retrieves them from a web server, including the hardened
//!   lineage's build server.
//!
//! Listing, filtering, and sorting of release names is shared: backends only
//! return raw directory entries and [`cagefetch_common::filter_releases`]
//! does the rest.

pub mod auth;
pub mod ftp;
pub mod http;
pub mod local;

use crate::config::{FetchSettings, TransportKind};
use crate::progress::Progress;
use cagefetch_common::{Channel, Release, filter_releases};
use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

/// The checksum ledger shipped with every release.
pub const MANIFEST: &str = "MANIFEST";
/// The base system archive.
pub const BASE: &str = "base.txz";
/// 32-bit compatibility libraries.
pub const LIB32: &str = "lib32.txz";
/// Documentation archive.
pub const DOC: &str = "doc.txz";

/// Errors raised by transport backends.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The server answered with a non-success status.
    #[error("{backend} returned status {code} for {resource}")]
    Status {
        /// Backend that issued the request.
        backend: &'static str,
        /// Protocol status code.
        code: u16,
        /// The URL or path requested.
        resource: String,
    },

    /// A mandatory file is not offered by the server.
    #[error("{resource} is required but {backend} does not have it")]
    Absent {
        /// Backend that was asked.
        backend: &'static str,
        /// The file that is missing.
        resource: String,
    },

    /// A required file is missing from a local source tree.
    #[error("{path} is a required file")]
    MissingFile {
        /// Where the file was expected.
        path: Utf8PathBuf,
    },

    /// The backend cannot perform this operation.
    #[error("{backend} does not support {operation}")]
    Unsupported {
        /// Backend that was asked.
        backend: &'static str,
        /// What was asked of it.
        operation: &'static str,
    },

    /// The connection or protocol exchange failed.
    #[error("{backend} error: {message}")]
    Protocol {
        /// Backend that failed.
        backend: &'static str,
        /// Description of the failure.
        message: String,
    },

    /// Writing a retrieved file failed.
    #[error("I/O error during transfer: {0}")]
    Io(#[from] std::io::Error),
}

/// The ordered set of files that make up a release.
///
/// `MANIFEST` is always present and always first.
///
/// # Examples
///
/// ```
/// use cagefetch::transport::FileSet;
///
/// let files = FileSet::standard().for_lineage(true);
/// assert_eq!(files.files(), ["MANIFEST", "base.txz", "doc.txz"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSet {
    files: Vec<String>,
}

impl FileSet {
    /// `MANIFEST`, `base.txz`, `lib32.txz`, and `doc.txz`.
    #[must_use]
    pub fn standard() -> Self {
        Self::new([MANIFEST, BASE, LIB32, DOC])
    }

    /// Build a set from names, inserting `MANIFEST` if it was omitted.
    pub fn new<I, S>(files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = vec![MANIFEST.to_owned()];
        for file in files {
            let file = file.into();
            if !unique.contains(&file) {
                unique.push(file);
            }
        }
        Self { files: unique }
    }

    /// Drop files that the hardened lineage does not publish.
    #[must_use]
    pub fn for_lineage(mut self, hardened: bool) -> Self {
        if hardened {
            self.files.retain(|file| file != LIB32);
        }
        self
    }

    /// Every file in the set, `MANIFEST` first.
    #[must_use]
    pub fn files(&self) -> &[String] {
        &self.files
    }

    /// The archives to verify and extract: everything except `MANIFEST`.
    pub fn archives(&self) -> impl Iterator<Item = &str> {
        self.files
            .iter()
            .map(String::as_str)
            .filter(|file| *file != MANIFEST)
    }

    /// Whether `file` is part of the set.
    #[must_use]
    pub fn contains(&self, file: &str) -> bool {
        self.files.iter().any(|entry| entry == file)
    }

    /// Remove optional files a backend reported as unavailable.
    ///
    /// Mandatory files are never removed.
    pub fn drop_optional(&mut self, dropped: &[String]) {
        self.files
            .retain(|file| is_mandatory(file) || !dropped.contains(file));
    }
}

impl Default for FileSet {
    fn default() -> Self {
        Self::standard()
    }
}

/// `MANIFEST` and the base system can never be skipped.
#[must_use]
pub fn is_mandatory(file: &str) -> bool {
    file == MANIFEST || file == BASE
}

/// What a backend did with a batch of requested files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOutcome {
    /// Optional files the server did not have.
    pub dropped: Vec<String>,
}

/// A source of release files.
#[cfg_attr(test, mockall::automock)]
pub trait ReleaseTransport {
    /// Short backend name used in messages.
    fn name(&self) -> &'static str;

    /// Channel of the releases this backend serves.
    fn channel(&self) -> Channel {
        Channel::Release
    }

    /// Raw directory entries from the release index.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the index cannot be read.
    fn list_entries(&self) -> Result<Vec<String>, TransportError>;

    /// Releases offered by this backend, filtered, deduplicated, and sorted.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the index cannot be read.
    fn list_releases(&self) -> Result<Vec<Release>, TransportError> {
        Ok(filter_releases(self.list_entries()?, self.channel()))
    }

    /// Check that every file can be retrieved before anything is created.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::MissingFile`] naming the first absent file.
    fn preflight(&self, _release: &Release, _files: &FileSet) -> Result<(), TransportError> {
        Ok(())
    }

    /// Retrieve `files` for `release` into `dest`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if any mandatory file cannot be retrieved.
    fn fetch(
        &self,
        release: &Release,
        files: &[String],
        dest: &Utf8Path,
    ) -> Result<FetchOutcome, TransportError>;
}

/// Build the backend selected by `settings`.
///
/// The hardened lineage is only published over HTTP, so it forces the HTTP
/// backend whatever transport was configured.
///
/// # Errors
///
/// Returns [`TransportError::Unsupported`] when the local backend is chosen
/// without a root directory.
pub fn from_settings(
    settings: &FetchSettings,
    progress: Progress,
) -> Result<Box<dyn ReleaseTransport>, TransportError> {
    let kind = if settings.hardened {
        TransportKind::Http
    } else {
        settings.transport
    };

    Ok(match kind {
        TransportKind::Local => {
            let root = settings
                .root_dir
                .as_deref()
                .ok_or(TransportError::Unsupported {
                    backend: local::BACKEND,
                    operation: "fetching without --root-dir",
                })?;
            Box::new(local::LocalTransport::new(Utf8PathBuf::from(root)))
        }
        TransportKind::Ftp => Box::new(ftp::FtpTransport::from_settings(settings, progress)),
        TransportKind::Http => Box::new(http::HttpTransport::from_settings(settings, progress)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn manifest_is_always_first() {
        let files = FileSet::new(["base.txz", "doc.txz"]);
        assert_eq!(files.files(), ["MANIFEST", "base.txz", "doc.txz"]);
    }

    #[test]
    fn duplicates_are_ignored() {
        let files = FileSet::new(["base.txz", "MANIFEST", "base.txz"]);
        assert_eq!(files.files(), ["MANIFEST", "base.txz"]);
    }

    #[test]
    fn archives_exclude_the_manifest() {
        let files = FileSet::standard();
        let archives: Vec<&str> = files.archives().collect();
        assert_eq!(archives, ["base.txz", "lib32.txz", "doc.txz"]);
    }

    #[test]
    fn standard_lineage_keeps_lib32() {
        assert!(FileSet::standard().for_lineage(false).contains(LIB32));
    }

    #[test]
    fn dropping_never_removes_mandatory_files() {
        let mut files = FileSet::standard();
        files.drop_optional(&["doc.txz".to_owned(), "base.txz".to_owned()]);
        assert_eq!(files.files(), ["MANIFEST", "base.txz", "lib32.txz"]);
    }

    #[rstest]
    #[case(MANIFEST, true)]
    #[case(BASE, true)]
    #[case(LIB32, false)]
    #[case(DOC, false)]
    fn mandatory_files(#[case] file: &str, #[case] expected: bool) {
        assert_eq!(is_mandatory(file), expected);
    }

    struct IndexOnly(Vec<&'static str>);

    impl ReleaseTransport for IndexOnly {
        fn name(&self) -> &'static str {
            "index"
        }

        fn list_entries(&self) -> Result<Vec<String>, TransportError> {
            Ok(self.0.iter().map(ToString::to_string).collect())
        }

        fn fetch(
            &self,
            _release: &Release,
            _files: &[String],
            _dest: &Utf8Path,
        ) -> Result<FetchOutcome, TransportError> {
            Ok(FetchOutcome::default())
        }
    }

    #[test]
    fn default_listing_filters_and_sorts_entries() {
        let transport = IndexOnly(vec!["11.2-RELEASE/", "README.TXT", "9.3-RELEASE/", "11.2-RELEASE"]);
        let releases: Vec<String> = transport
            .list_releases()
            .expect("listing")
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(releases, ["9.3-RELEASE", "11.2-RELEASE"]);
    }

    #[test]
    fn local_backend_requires_a_root_directory() {
        let settings = FetchSettings {
            transport: TransportKind::Local,
            root_dir: None,
            ..FetchSettings::default()
        };
        let err = from_settings(&settings, Progress::hidden()).err();
        assert!(matches!(err, Some(TransportError::Unsupported { .. })));
    }
}
