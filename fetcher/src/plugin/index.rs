//! The plugin index: a git clone of descriptors plus an `INDEX` catalogue.

use crate::error::{FetchError, Result};
use crate::git::GitClient;
use cagefetch_common::{Selection, SelectionError, resolve_plugin};
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::collections::BTreeMap;

/// File in the index clone listing every plugin.
pub const INDEX_FILE: &str = "INDEX";

/// One catalogue entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IndexEntry {
    /// Display name.
    pub name: String,
    /// One-line description.
    pub description: String,
    /// Whether the plugin carries license terms.
    #[serde(default)]
    pub license: Option<String>,
}

/// The parsed catalogue, keyed by package name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginIndex {
    dir: Utf8PathBuf,
    entries: BTreeMap<String, IndexEntry>,
}

impl PluginIndex {
    /// Parse `INDEX` JSON for a clone rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns the deserialisation error for malformed documents.
    pub fn parse(dir: &Utf8Path, text: &str) -> std::result::Result<Self, serde_json::Error> {
        Ok(Self {
            dir: dir.to_path_buf(),
            entries: serde_json::from_str(text)?,
        })
    }

    /// Read `INDEX` from the clone at `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::PluginIndex`] if the file is missing or malformed.
    pub fn load(dir: &Utf8Path) -> Result<Self> {
        let path = dir.join(INDEX_FILE);
        let text = std::fs::read_to_string(&path).map_err(|err| FetchError::PluginIndex {
            path: path.clone(),
            reason: err.to_string(),
        })?;
        Self::parse(dir, &text).map_err(|err| FetchError::PluginIndex {
            path,
            reason: err.to_string(),
        })
    }

    /// Package keys in menu order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of plugins listed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Return true when nothing is listed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entry for `key`, if listed.
    #[must_use]
    pub fn entry(&self, key: &str) -> Option<&IndexEntry> {
        self.entries.get(key)
    }

    /// Menu labels, `<name> - <description> (<key>)`, in key order.
    #[must_use]
    pub fn labels(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|(key, entry)| format!("{} - {} ({key})", entry.name, entry.description))
            .collect()
    }

    /// The license terms attached to `key`, if any.
    #[must_use]
    pub fn license_for(&self, key: &str) -> Option<&str> {
        self.entry(key)
            .and_then(|entry| entry.license.as_deref())
            .filter(|license| !license.is_empty())
    }

    /// Descriptor path for the plugin at menu position `index`.
    #[must_use]
    pub fn descriptor_at(&self, index: usize) -> Option<Utf8PathBuf> {
        self.keys()
            .nth(index)
            .map(|key| self.dir.join(format!("{key}.json")))
    }

    /// Resolve a menu answer to a descriptor path.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Selection`] when the answer matches nothing.
    pub fn choose(&self, answer: &str) -> Result<Selection<Utf8PathBuf>> {
        match resolve_plugin(&self.labels(), answer)? {
            Selection::Exit => Ok(Selection::Exit),
            Selection::Chosen(index) => self
                .descriptor_at(index)
                .map(Selection::Chosen)
                .ok_or_else(|| SelectionError::IndexOutOfRange { index }.into()),
        }
    }
}

/// Clone the index into `dir`, or pull it when a clone already exists.
///
/// # Errors
///
/// Returns [`FetchError::Git`] when the clone or pull fails.
pub fn sync_index(git: &dyn GitClient, url: &str, branch: &str, dir: &Utf8Path) -> Result<()> {
    if dir.join(".git").exists() {
        git.update_repository(dir)
    } else {
        git.clone_repository(url, branch, dir)
    }
}
