//! Error types for release fetching and plugin provisioning.
//!
//! Every failure in the pipeline is carried up to the binary as a
//! [`FetchError`], which prints it once and maps it to an exit status.
//! Subsystem errors keep their own enums and convert into this one.

use crate::extract::ExtractionError;
use crate::manifest::ManifestError;
use crate::transport::TransportError;
use crate::verify::FileFault;
use cagefetch_common::{ReleaseError, SelectionError};
use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors that can occur while fetching a release or provisioning a plugin.
#[derive(Debug, Error)]
pub enum FetchError {
    /// A transport backend failed to list or retrieve a resource.
    #[error(transparent)]
    Transport(TransportError),

    /// A required file is absent from a local source tree.
    #[error("{path} is a required file; place it there and retry")]
    MissingFile {
        /// Where the file was expected.
        path: Utf8PathBuf,
    },

    /// A file still failed verification after being downloaded again.
    #[error("too many failed verifications: {file} {fault}")]
    TooManyFailedVerifications {
        /// The file that failed twice.
        file: String,
        /// Why the second check failed.
        fault: FileFault,
    },

    /// The checksum manifest could not be read or parsed.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// An archive could not be extracted safely.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// A release identifier was malformed.
    #[error(transparent)]
    Release(#[from] ReleaseError),

    /// An interactive answer did not resolve to a menu entry.
    #[error(transparent)]
    Selection(#[from] SelectionError),

    /// A backing dataset could not be created or mounted.
    #[error("dataset {dataset}: {reason}")]
    Dataset {
        /// Name of the dataset.
        dataset: String,
        /// Description of the failure.
        reason: String,
    },

    /// A host command exited unsuccessfully.
    #[error("{command} failed: {message}")]
    CommandFailed {
        /// The command line that was run.
        command: String,
        /// Captured standard error, trimmed.
        message: String,
    },

    /// The plugin descriptor is missing or malformed.
    #[error("plugin descriptor {path}: {reason}")]
    Descriptor {
        /// Path of the descriptor.
        path: Utf8PathBuf,
        /// Description of the failure.
        reason: String,
    },

    /// The plugin index is missing or malformed.
    #[error("plugin index {path}: {reason}")]
    PluginIndex {
        /// Path of the `INDEX` file.
        path: Utf8PathBuf,
        /// Description of the failure.
        reason: String,
    },

    /// The operator declined the plugin's license terms.
    #[error("you must accept the license of {plugin} to continue")]
    LicenseRejected {
        /// Name of the plugin.
        plugin: String,
    },

    /// The plugin jail was created without any usable address.
    #[error("an IP address is needed to fetch a plugin; destroyed partial plugin {jail}")]
    NoNetworkAddress {
        /// Name of the destroyed jail.
        jail: String,
    },

    /// A kernel module required by the plugin could not be loaded.
    #[error("kernel module {module} could not be loaded: {message}")]
    KernelModule {
        /// Name of the module.
        module: String,
        /// Captured standard error, trimmed.
        message: String,
    },

    /// The plugin's post-install script failed.
    #[error("post_install.sh failed in {jail}: {message}")]
    PostInstall {
        /// Name of the jail.
        jail: String,
        /// Captured output, trimmed.
        message: String,
    },

    /// A plugin jail could not be provisioned.
    #[error("provisioning {jail} failed: {reason}")]
    Provisioning {
        /// Name of the jail.
        jail: String,
        /// Description of the failure.
        reason: String,
    },

    /// Provisioning was interrupted and the partial jail destroyed.
    #[error("interrupted; destroyed partial plugin {jail}")]
    Interrupted {
        /// Name of the destroyed jail.
        jail: String,
    },

    /// Git clone or update operation failed.
    #[error("git {operation} failed: {message}")]
    Git {
        /// The git operation that failed (clone, pull).
        operation: &'static str,
        /// Description of the failure.
        message: String,
    },

    /// The configuration file or flags are inconsistent.
    #[error("configuration error: {reason}")]
    Config {
        /// Description of the problem.
        reason: String,
    },

    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Test stub received an unexpected or mismatched command invocation.
    #[cfg(any(test, feature = "test-support"))]
    #[error("stub mismatch: {message}")]
    StubMismatch {
        /// Description of what was expected versus what was received.
        message: String,
    },
}

impl From<TransportError> for FetchError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::MissingFile { path } => Self::MissingFile { path },
            other => Self::Transport(other),
        }
    }
}

/// Result type alias using [`FetchError`].
pub type Result<T> = std::result::Result<T, FetchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_local_file_names_the_expected_path() {
        let err = FetchError::from(TransportError::MissingFile {
            path: Utf8PathBuf::from("/srv/releases/11.2-RELEASE/MANIFEST"),
        });
        assert!(matches!(err, FetchError::MissingFile { .. }));
        assert!(err.to_string().contains("/srv/releases/11.2-RELEASE/MANIFEST"));
    }

    #[test]
    fn other_transport_errors_are_wrapped() {
        let err = FetchError::from(TransportError::Status {
            backend: "http",
            code: 404,
            resource: "https://example.test/base.txz".to_owned(),
        });
        let msg = err.to_string();
        assert!(matches!(err, FetchError::Transport(_)));
        assert!(msg.contains("http"));
        assert!(msg.contains("404"));
    }

    #[test]
    fn repeated_verification_failure_names_the_file() {
        let err = FetchError::TooManyFailedVerifications {
            file: "base.txz".to_owned(),
            fault: FileFault::Missing,
        };
        let msg = err.to_string();
        assert!(msg.contains("too many failed verifications"));
        assert!(msg.contains("base.txz"));
    }

    #[test]
    fn git_error_includes_operation_and_message() {
        let err = FetchError::Git {
            operation: "clone",
            message: "network error".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("clone"));
        assert!(msg.contains("network error"));
    }

    #[test]
    fn license_rejection_names_the_plugin() {
        let err = FetchError::LicenseRejected {
            plugin: "plexmediaserver".to_owned(),
        };
        assert!(err.to_string().contains("plexmediaserver"));
    }
}
