//! Trusted package repositories inside a plugin jail.
//!
//! `pkg` reads one UCL file per repository from `usr/local/etc/pkg/repos`
//! and trusted keys from the directory the repository names. The upstream
//! `FreeBSD` repository is switched off so only the declared sites are used.

use super::descriptor::Fingerprint;
use crate::error::Result;
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::BTreeMap;

const REPOS_DIR: &str = "usr/local/etc/pkg/repos";
const FINGERPRINTS_DIR: &str = "usr/local/etc/pkg/fingerprints";

/// Render the UCL block for one repository.
#[must_use]
pub fn repository_conf(name: &str, packagesite: &str) -> String {
    format!(
        "{name}: {{\n    url: \"{packagesite}\",\n    signature_type: \"fingerprints\",\n    \
         fingerprints: \"/{FINGERPRINTS_DIR}/{name}\",\n    enabled: true\n}}\n"
    )
}

/// Render every key of one repository into a single trusted-keys file.
#[must_use]
pub fn fingerprint_file(keys: &[Fingerprint]) -> String {
    keys.iter()
        .map(|key| {
            format!(
                "function: \"{}\"\nfingerprint: \"{}\"\n",
                key.function, key.fingerprint
            )
        })
        .collect()
}

/// Write the repository configuration for `fingerprints` below `jail_root`.
///
/// Returns the files written, the disabling `FreeBSD.conf` first.
///
/// # Errors
///
/// Returns any I/O error from creating directories or files.
pub fn write_repositories(
    jail_root: &Utf8Path,
    packagesite: &str,
    fingerprints: &BTreeMap<String, Vec<Fingerprint>>,
) -> Result<Vec<Utf8PathBuf>> {
    let repos = jail_root.join(REPOS_DIR);
    std::fs::create_dir_all(&repos)?;

    let upstream = repos.join("FreeBSD.conf");
    std::fs::write(&upstream, "FreeBSD: { enabled: no }\n")?;
    let mut written = vec![upstream];

    for (name, keys) in fingerprints {
        let conf = repos.join(format!("{name}.conf"));
        std::fs::write(&conf, repository_conf(name, packagesite))?;

        let trusted = jail_root.join(FINGERPRINTS_DIR).join(name).join("trusted");
        std::fs::create_dir_all(&trusted)?;
        let keyfile = trusted.join(name);
        std::fs::write(&keyfile, fingerprint_file(keys))?;

        log::debug!("configured package repository {name}");
        written.push(conf);
        written.push(keyfile);
    }
    Ok(written)
}
