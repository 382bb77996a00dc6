//! Unpacking release archives into a release dataset.
//!
//! Release archives are xz-compressed tarballs whose members are all named
//! relative to `./`. Members are screened twice: the whole archive is
//! scanned for names that would land outside the destination before
//! anything is touched, then each accepted member's stale target is removed
//! and the member is unpacked.

use camino::Utf8Path;
use std::fs::File;
use std::io;
use thiserror::Error;

/// Errors raised while extracting an archive.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// A member would be written outside the destination.
    #[error("archive member {path} escapes the destination")]
    PathTraversal {
        /// The offending member name.
        path: String,
    },

    /// Reading the archive or writing a member failed.
    #[error("extraction I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Unpacks one archive into a directory.
#[cfg_attr(test, mockall::automock)]
pub trait ArchiveExtractor {
    /// Extract `archive` into `dest`, returning the number of members written.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::PathTraversal`] before writing anything if
    /// any member escapes `dest`.
    fn extract(&self, archive: &Utf8Path, dest: &Utf8Path) -> Result<usize, ExtractionError>;
}

/// Extractor for `.txz` release archives.
#[derive(Debug, Clone, Copy, Default)]
pub struct TxzExtractor;

impl ArchiveExtractor for TxzExtractor {
    fn extract(&self, archive: &Utf8Path, dest: &Utf8Path) -> Result<usize, ExtractionError> {
        log::info!("extracting {archive}");
        for name in member_names(archive)? {
            if escapes_root(&name) {
                return Err(ExtractionError::PathTraversal { path: name });
            }
        }

        let mut tarball = open(archive)?;
        let mut written = 0;
        for entry in tarball.entries()? {
            let mut entry = entry?;
            let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
            match classify(&name) {
                Member::Root => continue,
                Member::Rejected => {
                    log::warn!("skipping archive member {name}");
                    continue;
                }
                Member::Accepted(relative) => {
                    remove_stale(&dest.join(relative), entry.header().entry_type().is_dir())?;
                }
            }
            entry.set_preserve_permissions(true);
            entry.set_preserve_mtime(true);
            if entry.unpack_in(dest)? {
                written += 1;
            } else {
                return Err(ExtractionError::PathTraversal { path: name });
            }
        }
        log::debug!("extracted {written} members from {archive}");
        Ok(written)
    }
}

fn open(archive: &Utf8Path) -> io::Result<tar::Archive<xz2::read::XzDecoder<File>>> {
    let file = File::open(archive)?;
    Ok(tar::Archive::new(xz2::read::XzDecoder::new(file)))
}

fn member_names(archive: &Utf8Path) -> io::Result<Vec<String>> {
    let mut tarball = open(archive)?;
    tarball
        .entries()?
        .map(|entry| entry.map(|e| String::from_utf8_lossy(&e.path_bytes()).into_owned()))
        .collect()
}

/// How a member name is treated.
#[derive(Debug, PartialEq, Eq)]
enum Member<'a> {
    /// `.` itself.
    Root,
    /// Not of the `./relative` form, or containing `..`.
    Rejected,
    /// Safe to unpack at this relative path.
    Accepted(&'a str),
}

fn classify(name: &str) -> Member<'_> {
    let trimmed = name.trim_end_matches('/');
    if trimmed == "." {
        return Member::Root;
    }
    match trimmed.strip_prefix("./") {
        Some(relative)
            if !relative.is_empty() && !relative.split('/').any(|segment| segment == "..") =>
        {
            Member::Accepted(relative)
        }
        _ => Member::Rejected,
    }
}

/// Whether a member name resolves above the extraction root.
fn escapes_root(name: &str) -> bool {
    if name.starts_with('/') {
        return true;
    }
    let mut depth: usize = 0;
    for segment in name.split('/') {
        match segment {
            "" | "." => {}
            ".." => match depth.checked_sub(1) {
                Some(parent) => depth = parent,
                None => return true,
            },
            _ => depth += 1,
        }
    }
    false
}

/// Remove an existing target so the member replaces it.
///
/// Directories are kept when the member is a directory too, since earlier
/// archives of the same release populate them.
fn remove_stale(target: &Utf8Path, member_is_dir: bool) -> io::Result<()> {
    let Ok(meta) = std::fs::symlink_metadata(target) else {
        return Ok(());
    };
    if meta.is_dir() {
        if member_is_dir {
            return Ok(());
        }
        return std::fs::remove_dir_all(target);
    }
    std::fs::remove_file(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{Member as Fixture, write_txz};
    use camino::Utf8PathBuf;
    use rstest::rstest;
    use tempfile::TempDir;

    fn workspace() -> (TempDir, Utf8PathBuf, Utf8PathBuf) {
        let dir = tempfile::tempdir().expect("temp dir");
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("utf8");
        let dest = root.join("root");
        std::fs::create_dir(&dest).expect("dest");
        (dir, root.join("base.txz"), dest)
    }

    #[rstest]
    #[case("./etc/rc.conf", Member::Accepted("etc/rc.conf"))]
    #[case("./usr/", Member::Accepted("usr"))]
    #[case("./", Member::Root)]
    #[case(".", Member::Root)]
    #[case("etc/rc.conf", Member::Rejected)]
    #[case("./usr/../etc", Member::Rejected)]
    fn member_classification(#[case] name: &str, #[case] expected: Member<'_>) {
        assert_eq!(classify(name), expected);
    }

    #[rstest]
    #[case("../../etc/passwd", true)]
    #[case("/etc/passwd", true)]
    #[case("./a/../../b", true)]
    #[case("./a/../b", false)]
    #[case("./bin/sh", false)]
    fn escape_detection(#[case] name: &str, #[case] escapes: bool) {
        assert_eq!(escapes_root(name), escapes);
    }

    #[test]
    fn extracts_relative_members() {
        let (_dir, archive, dest) = workspace();
        write_txz(
            archive.as_std_path(),
            &[
                Fixture::Dir("./"),
                Fixture::Dir("./etc/"),
                Fixture::File("./etc/rc.conf", b"sshd_enable=YES\n"),
                Fixture::Symlink("./etc/rc.conf.local", "rc.conf"),
            ],
        )
        .expect("archive");

        let written = TxzExtractor.extract(&archive, &dest).expect("extract");

        assert_eq!(written, 3);
        let body = std::fs::read_to_string(dest.join("etc/rc.conf")).expect("read");
        assert_eq!(body, "sshd_enable=YES\n");
        let link = std::fs::read_link(dest.join("etc/rc.conf.local")).expect("symlink");
        assert_eq!(link, std::path::Path::new("rc.conf"));
    }

    #[test]
    fn traversal_is_rejected_before_any_write() {
        let (dir, archive, dest) = workspace();
        write_txz(
            archive.as_std_path(),
            &[
                Fixture::File("./harmless", b"ok"),
                Fixture::File("../../etc/passwd", b"root::0:0"),
            ],
        )
        .expect("archive");

        let err = TxzExtractor.extract(&archive, &dest).expect_err("escape");

        assert!(matches!(err, ExtractionError::PathTraversal { ref path } if path == "../../etc/passwd"));
        assert!(!dest.join("harmless").exists());
        assert!(!dir.path().join("etc/passwd").exists());
    }

    #[test]
    fn unsafe_names_that_stay_inside_are_skipped() {
        let (_dir, archive, dest) = workspace();
        write_txz(
            archive.as_std_path(),
            &[
                Fixture::File("plain", b"no prefix"),
                Fixture::File("./a/../b", b"dotdot"),
                Fixture::File("./kept", b"kept"),
            ],
        )
        .expect("archive");

        let written = TxzExtractor.extract(&archive, &dest).expect("extract");

        assert_eq!(written, 1);
        assert!(dest.join("kept").is_file());
        assert!(!dest.join("plain").exists());
        assert!(!dest.join("b").exists());
    }

    #[test]
    fn stale_targets_are_replaced() {
        let (_dir, archive, dest) = workspace();
        std::fs::write(dest.join("motd"), b"old").expect("stale");
        write_txz(archive.as_std_path(), &[Fixture::File("./motd", b"new")]).expect("archive");

        TxzExtractor.extract(&archive, &dest).expect("extract");

        assert_eq!(std::fs::read(dest.join("motd")).expect("read"), b"new");
    }
}
