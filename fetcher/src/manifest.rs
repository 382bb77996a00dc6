//! Release checksum manifest.
//!
//! A `MANIFEST` holds one tab-separated line per archive:
//! `<file>\t<sha256>\t<count>\t<component>\t<description>\t<default>`.
//! Only the first two columns are consumed.

use camino::Utf8Path;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::str::FromStr;
use thiserror::Error;

const BLOCK_SIZE: usize = 64 * 1024;

/// Errors raised while reading a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// A line lacks the file or digest column.
    #[error("MANIFEST line {line} is malformed: {reason}")]
    Malformed {
        /// One-based line number.
        line: usize,
        /// What is wrong with it.
        reason: String,
    },

    /// A digest column is not a SHA-256 hex string.
    #[error("MANIFEST digest for {file} is invalid: {reason}")]
    InvalidDigest {
        /// The file the digest belongs to.
        file: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The manifest could not be read.
    #[error("cannot read MANIFEST: {0}")]
    Io(#[from] std::io::Error),
}

/// A lowercase hex SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Sha256Digest(String);

impl Sha256Digest {
    /// The digest as lowercase hex.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Sha256Digest {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if value.len() != 64 {
            return Err(format!("expected 64 hex digits, found {}", value.len()));
        }
        if !value.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err("contains non-hex characters".to_owned());
        }
        Ok(Self(value.to_ascii_lowercase()))
    }
}

impl fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Expected digests keyed by file name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: BTreeMap<String, Sha256Digest>,
}

impl Manifest {
    /// Parse manifest text. Blank lines are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Malformed`] for a line without a digest column
    /// and [`ManifestError::InvalidDigest`] for a digest that is not SHA-256.
    ///
    /// # Examples
    ///
    /// ```
    /// use cagefetch::manifest::Manifest;
    ///
    /// let digest = "a".repeat(64);
    /// let manifest = Manifest::parse(&format!("base.txz\t{digest}\t26\tbase\t\"Base system\"\ton\n"))?;
    /// assert_eq!(manifest.digest_for("base.txz").map(|d| d.as_str()), Some(digest.as_str()));
    /// # Ok::<(), cagefetch::manifest::ManifestError>(())
    /// ```
    pub fn parse(text: &str) -> Result<Self, ManifestError> {
        let mut entries = BTreeMap::new();
        for (idx, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let mut columns = line.split('\t');
            let file = columns.next().map(str::trim).unwrap_or_default();
            let Some(digest) = columns.next() else {
                return Err(ManifestError::Malformed {
                    line: idx + 1,
                    reason: "missing digest column".to_owned(),
                });
            };
            if file.is_empty() {
                return Err(ManifestError::Malformed {
                    line: idx + 1,
                    reason: "missing file name".to_owned(),
                });
            }
            let digest = digest
                .parse::<Sha256Digest>()
                .map_err(|reason| ManifestError::InvalidDigest {
                    file: file.to_owned(),
                    reason,
                })?;
            entries.insert(file.to_owned(), digest);
        }
        Ok(Self { entries })
    }

    /// Read and parse the manifest at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError`] if the file is unreadable or malformed.
    pub fn load(path: &Utf8Path) -> Result<Self, ManifestError> {
        Self::parse(&std::fs::read_to_string(path)?)
    }

    /// The expected digest of `file`, if listed.
    #[must_use]
    pub fn digest_for(&self, file: &str) -> Option<&Sha256Digest> {
        self.entries.get(file)
    }

    /// Number of listed files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no files are listed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// SHA-256 of the file at `path`, read in fixed-size blocks.
///
/// # Errors
///
/// Returns any I/O error from opening or reading the file.
pub fn compute_sha256(path: &Utf8Path) -> std::io::Result<Sha256Digest> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut block = vec![0_u8; BLOCK_SIZE];
    loop {
        let read = file.read(&mut block)?;
        if read == 0 {
            break;
        }
        hasher.update(block.get(..read).unwrap_or_default());
    }
    Ok(Sha256Digest(format!("{:x}", hasher.finalize())))
}
