//! Release identifiers and their total ordering.
//!
//! A release identifier has the shape `<major>.<minor>-RELEASE`, or
//! `<major>-STABLE` for the hardened lineage. Identifiers compare on their
//! numeric components first and on the channel second, so `9.3-RELEASE`
//! sorts before `10.0-RELEASE` even though it is lexically larger.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Channel suffix of a release identifier.
///
/// The declaration order is the tie-break order: for identical numeric
/// components a `-RELEASE` sorts before a `-STABLE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    /// A numbered point release (`-RELEASE`).
    Release,
    /// A hardened lineage snapshot (`-STABLE`).
    Stable,
}

impl Channel {
    /// Return the upper-case channel name without the leading dash.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Release => "RELEASE",
            Self::Stable => "STABLE",
        }
    }

    /// Return the marker used to recognise this channel in directory listings.
    ///
    /// # Examples
    ///
    /// ```
    /// use cagefetch_common::release::Channel;
    ///
    /// assert_eq!(Channel::Release.marker(), "-RELEASE");
    /// assert_eq!(Channel::Stable.marker(), "-STABLE");
    /// ```
    #[must_use]
    pub const fn marker(self) -> &'static str {
        match self {
            Self::Release => "-RELEASE",
            Self::Stable => "-STABLE",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors arising from parsing a release identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReleaseError {
    /// The identifier was empty or whitespace.
    #[error("release identifier is empty")]
    Empty,

    /// The identifier has no `-<CHANNEL>` suffix.
    #[error("release \"{value}\" has no channel suffix")]
    MissingChannel {
        /// The rejected identifier.
        value: String,
    },

    /// The channel suffix is not one this tool understands.
    #[error("release \"{value}\" has unsupported channel \"{channel}\"")]
    UnknownChannel {
        /// The rejected identifier.
        value: String,
        /// The unrecognised suffix.
        channel: String,
    },

    /// The numeric part is not `<major>` or `<major>.<minor>`.
    #[error("release \"{value}\" has an invalid version number")]
    InvalidVersion {
        /// The rejected identifier.
        value: String,
    },
}

/// A parsed, normalised release identifier.
///
/// Field order defines the ordering: major, then minor (a missing minor
/// sorts before `.0`), then channel.
///
/// # Examples
///
/// ```
/// use cagefetch_common::release::Release;
///
/// let old: Release = "9.3-RELEASE".parse().unwrap();
/// let new: Release = "10.0-release".parse().unwrap();
/// assert!(old < new);
/// assert_eq!(new.to_string(), "10.0-RELEASE");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Release {
    major: u32,
    minor: Option<u32>,
    channel: Channel,
}

impl Release {
    /// Build a release from its components.
    #[must_use]
    pub const fn new(major: u32, minor: Option<u32>, channel: Channel) -> Self {
        Self {
            major,
            minor,
            channel,
        }
    }

    /// Return the major version number.
    #[must_use]
    pub const fn major(&self) -> u32 {
        self.major
    }

    /// Return the minor version number, if the identifier carries one.
    #[must_use]
    pub const fn minor(&self) -> Option<u32> {
        self.minor
    }

    /// Return the channel suffix.
    #[must_use]
    pub const fn channel(&self) -> Channel {
        self.channel
    }

    /// Return true for identifiers of the hardened lineage.
    #[must_use]
    pub const fn is_hardened(&self) -> bool {
        matches!(self.channel, Channel::Stable)
    }

    /// Rewrite this identifier onto the hardened lineage.
    ///
    /// The hardened lineage tracks major branches only, so the minor
    /// component is dropped.
    ///
    /// # Examples
    ///
    /// ```
    /// use cagefetch_common::release::Release;
    ///
    /// let release: Release = "11.2-RELEASE".parse().unwrap();
    /// assert_eq!(release.to_hardened().to_string(), "11-STABLE");
    /// ```
    #[must_use]
    pub const fn to_hardened(&self) -> Self {
        Self {
            major: self.major,
            minor: None,
            channel: Channel::Stable,
        }
    }

    /// Return true when the release ships a `freebsd-version` binary.
    ///
    /// Releases from the single-digit major branches predate it.
    #[must_use]
    pub const fn has_version_binary(&self) -> bool {
        self.major >= 10
    }
}

impl fmt::Display for Release {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.minor {
            Some(minor) => write!(f, "{}.{minor}-{}", self.major, self.channel),
            None => write!(f, "{}-{}", self.major, self.channel),
        }
    }
}

impl FromStr for Release {
    type Err = ReleaseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalised = value.trim().to_ascii_uppercase();
        if normalised.is_empty() {
            return Err(ReleaseError::Empty);
        }

        let Some((version, channel)) = normalised.split_once('-') else {
            return Err(ReleaseError::MissingChannel { value: normalised });
        };

        let channel = match channel {
            "RELEASE" => Channel::Release,
            "STABLE" => Channel::Stable,
            other => {
                return Err(ReleaseError::UnknownChannel {
                    channel: other.to_owned(),
                    value: normalised.clone(),
                });
            }
        };

        let (major, minor) = parse_version(version).ok_or_else(|| ReleaseError::InvalidVersion {
            value: normalised.clone(),
        })?;

        Ok(Self::new(major, minor, channel))
    }
}

impl TryFrom<&str> for Release {
    type Error = ReleaseError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl Serialize for Release {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Release {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Parse `<major>` or `<major>.<minor>` into numeric components.
pub(crate) fn parse_version(version: &str) -> Option<(u32, Option<u32>)> {
    match version.split_once('.') {
        Some((major, minor)) => Some((parse_number(major)?, Some(parse_number(minor)?))),
        None => Some((parse_number(version)?, None)),
    }
}

fn parse_number(digits: &str) -> Option<u32> {
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
