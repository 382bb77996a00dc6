//! End-of-life release markers.

use crate::error::Result;
use crate::transport::http;
use cagefetch_common::Release;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Advisory page listing unsupported releases.
pub const EOL_URL: &str = "https://www.freebsd.org/security/unsupported.html";

/// Fetch the advisory page and return the releases it lists.
///
/// # Errors
///
/// Returns a transport error if the page cannot be retrieved.
pub fn fetch_end_of_life() -> Result<Vec<Release>> {
    log::debug!("fetching end-of-life list from {EOL_URL}");
    Ok(parse_eol_page(&http::fetch_text(EOL_URL)?))
}

/// Every `N.N-RELEASE` (or `N-RELEASE`) token on the page, deduplicated.
///
/// # Examples
///
/// ```
/// use cagefetch::eol::parse_eol_page;
///
/// let found = parse_eol_page("<td>FreeBSD 10.3-RELEASE</td><td>9.3-RELEASE</td>");
/// let names: Vec<String> = found.iter().map(ToString::to_string).collect();
/// assert_eq!(names, ["9.3-RELEASE", "10.3-RELEASE"]);
/// ```
#[must_use]
pub fn parse_eol_page(html: &str) -> Vec<Release> {
    let Some(pattern) = release_token() else {
        return Vec::new();
    };
    pattern
        .captures_iter(html)
        .filter_map(|caps| caps.get(1))
        .filter_map(|version| format!("{}-RELEASE", version.as_str()).parse().ok())
        .collect::<BTreeSet<Release>>()
        .into_iter()
        .collect()
}

fn release_token() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\b(\d+(?:\.\d+)?)-RELEASE\b").ok())
        .as_ref()
}
