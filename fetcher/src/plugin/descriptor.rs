//! Plugin descriptors.
//!
//! A descriptor is a JSON document naming the release a plugin runs on, the
//! packages it installs, the repositories those packages come from, and the
//! artifact repository holding its post-install script.

use crate::error::{FetchError, Result};
use cagefetch_common::Release;
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;

/// One trusted signing key of a package repository.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Fingerprint {
    /// Hash function, for example `sha256`.
    pub function: String,
    /// The key fingerprint.
    pub fingerprint: String,
}

/// A parsed plugin descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PluginDescriptor {
    /// Display name.
    pub name: String,
    /// Release the plugin jail is created from.
    pub release: Release,
    /// Git repository with the overlay and `post_install.sh`.
    pub artifact: String,
    /// Packages to install, in order.
    pub pkgs: Vec<String>,
    /// Trusted keys per repository name.
    pub fingerprints: BTreeMap<String, Vec<Fingerprint>>,
    /// Package site all repositories point at.
    pub packagesite: String,
    /// Extra jail properties.
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    /// Kernel modules loaded on the host before installation.
    #[serde(default, deserialize_with = "kernel_modules")]
    pub kmods: Vec<String>,
    /// URL of license terms to accept before installation.
    #[serde(default)]
    pub license: Option<String>,
}

impl PluginDescriptor {
    /// Where a descriptor reference points.
    ///
    /// A reference ending in `.json` is a path; anything else is a plugin
    /// name looked up in the index clone.
    #[must_use]
    pub fn resolve_path(reference: &str, index_dir: &Utf8Path) -> Utf8PathBuf {
        if reference.ends_with(".json") {
            Utf8PathBuf::from(reference)
        } else {
            index_dir.join(format!("{reference}.json"))
        }
    }

    /// Parse descriptor JSON.
    ///
    /// # Errors
    ///
    /// Returns the deserialisation error for malformed documents.
    pub fn parse(text: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Read and parse the descriptor at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Descriptor`] if the file is missing or malformed.
    pub fn load(path: &Utf8Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|err| FetchError::Descriptor {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        Self::parse(&text).map_err(|err| FetchError::Descriptor {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })
    }

    /// Move the plugin onto the hardened lineage when `hardened` is set.
    #[must_use]
    pub fn for_lineage(mut self, hardened: bool) -> Self {
        if hardened {
            self.release = self.release.to_hardened();
        }
        self
    }

    /// Key of this plugin in the index.
    ///
    /// The last package's base name is authoritative; the lowercased plugin
    /// name is used when no packages are declared.
    #[must_use]
    pub fn license_key(&self) -> String {
        self.pkgs.last().map_or_else(
            || self.name.trim_matches('-').to_lowercase(),
            |pkg| pkg.rsplit('/').next().unwrap_or(pkg).to_owned(),
        )
    }

    /// Declared properties rendered as `key=value` strings.
    #[must_use]
    pub fn property_pairs(&self) -> Vec<(String, String)> {
        self.properties
            .iter()
            .map(|(key, value)| (key.clone(), property_value(value)))
            .collect()
    }
}

fn property_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Accept `kmods` as a list of names or as a mapping keyed by name.
fn kernel_modules<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Modules {
        List(Vec<String>),
        Map(BTreeMap<String, Value>),
    }

    Ok(match Modules::deserialize(deserializer)? {
        Modules::List(names) => names,
        Modules::Map(map) => map.into_keys().collect(),
    })
}
