//! Deriving a default release from the running kernel's version string.

use crate::release::{Channel, Release, parse_version};

/// Map a kernel release string (as printed by `uname -r`) to a release.
///
/// - HardenedBSD kernels (`-HBSD`) map to the `-STABLE` lineage of their
///   major branch.
/// - `-STABLE` kernels, as run by FreeNAS, map to the matching `-RELEASE`.
/// - `-RELEASE` kernels map to themselves with any patch level removed.
///
/// Anything else yields `None`.
///
/// # Examples
///
/// ```
/// use cagefetch_common::host::host_release;
///
/// let host = host_release("11.2-RELEASE-p4").map(|r| r.to_string());
/// assert_eq!(host.as_deref(), Some("11.2-RELEASE"));
/// ```
#[must_use]
pub fn host_release(kernel_release: &str) -> Option<Release> {
    let upper = kernel_release.trim().to_ascii_uppercase();
    let (version, _) = upper.split_once('-')?;
    let (major, minor) = parse_version(version)?;

    if upper.contains("-HBSD") {
        Some(Release::new(major, None, Channel::Stable))
    } else if upper.contains(Channel::Stable.marker()) || upper.contains(Channel::Release.marker())
    {
        Some(Release::new(major, minor, Channel::Release))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::patched("11.2-RELEASE-p4", Some("11.2-RELEASE"))]
    #[case::unpatched("11.2-RELEASE", Some("11.2-RELEASE"))]
    #[case::freenas_stable("11.1-STABLE", Some("11.1-RELEASE"))]
    #[case::hardened("12.0-STABLE-HBSD", Some("12-STABLE"))]
    #[case::lower_case("10.4-release-p9", Some("10.4-RELEASE"))]
    #[case::current("13.0-CURRENT", None)]
    #[case::garbage("not a version", None)]
    #[case::empty("", None)]
    fn maps_kernel_strings(#[case] input: &str, #[case] expected: Option<&str>) {
        let got = host_release(input).map(|r| r.to_string());
        assert_eq!(got.as_deref(), expected);
    }
}
