//! Turning raw mirror directory entries into an ordered release menu.

use crate::release::{Channel, Release};
use std::collections::BTreeSet;
use std::fmt;

/// Filter raw directory entries down to the releases of one channel.
///
/// Entries are matched on the channel marker (`-RELEASE` or `-STABLE`),
/// trailing slashes are ignored, and entries that do not parse as a release
/// identifier are dropped. The result is deduplicated and sorted ascending.
///
/// # Examples
///
/// ```
/// use cagefetch_common::listing::filter_releases;
/// use cagefetch_common::release::Channel;
///
/// let entries = ["10.4-RELEASE/", "9.3-RELEASE/", "README.TXT", "11.2-RELEASE/"];
/// let releases = filter_releases(entries, Channel::Release);
/// let rendered: Vec<String> = releases.iter().map(ToString::to_string).collect();
/// assert_eq!(rendered, ["9.3-RELEASE", "10.4-RELEASE", "11.2-RELEASE"]);
/// ```
pub fn filter_releases<I, S>(entries: I, channel: Channel) -> Vec<Release>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let marker = channel.marker();
    entries
        .into_iter()
        .filter_map(|entry| {
            let name = entry.as_ref().trim().trim_end_matches('/');
            if !name.to_ascii_uppercase().contains(marker) {
                return None;
            }
            name.parse::<Release>()
                .ok()
                .filter(|release| release.channel() == channel)
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Extract the hardened release identifier from a snapshot directory name.
///
/// Hardened mirrors publish directories such as
/// `HardenedBSD-11-STABLE-amd64-LATEST/`; the identifier is the `11-STABLE`
/// fragment.
///
/// # Examples
///
/// ```
/// use cagefetch_common::listing::hardened_entry;
///
/// let release = hardened_entry("HardenedBSD-11-STABLE-amd64-LATEST/");
/// assert_eq!(release.map(|r| r.to_string()).as_deref(), Some("11-STABLE"));
/// assert!(hardened_entry("HardenedBSD-11-CURRENT-amd64-LATEST/").is_none());
/// ```
#[must_use]
pub fn hardened_entry(name: &str) -> Option<Release> {
    let mut parts = name.trim().trim_end_matches('/').split('-');
    let vendor = parts.next()?;
    if !vendor.eq_ignore_ascii_case("HardenedBSD") {
        return None;
    }
    let major = parts.next()?;
    let channel = parts.next()?;
    if !channel.eq_ignore_ascii_case(Channel::Stable.as_str()) {
        return None;
    }
    format!("{major}-{channel}").parse().ok()
}

/// One numbered line of an interactive release menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuEntry {
    /// Zero-based position accepted as a selection.
    pub index: usize,
    /// The release offered at this position.
    pub release: Release,
    /// Whether the release is past its end of life.
    pub eol: bool,
}

impl fmt::Display for MenuEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.index, self.release)?;
        if self.eol {
            f.write_str(" (EOL)")?;
        }
        Ok(())
    }
}

/// Number the releases and annotate those present in `eol`.
#[must_use]
pub fn menu_entries(releases: &[Release], eol: &[Release]) -> Vec<MenuEntry> {
    releases
        .iter()
        .enumerate()
        .map(|(index, release)| MenuEntry {
            index,
            release: release.clone(),
            eol: eol.contains(release),
        })
        .collect()
}
