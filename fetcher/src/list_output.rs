//! Output formatting for release and plugin listings.
//!
//! Listings go to standard output so they can be piped; prompts and logs go
//! to standard error.

use crate::plugin::PluginIndex;
use cagefetch_common::MenuEntry;
use serde::Serialize;

/// Width a header table is fitted to unless long output is requested.
pub const TABLE_WIDTH: usize = 80;

const ELLIPSIS: &str = "...";

/// One row of the plugin listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginRow {
    /// Display name.
    pub name: String,
    /// One-line description.
    pub description: String,
    /// Package key, accepted by `cagefetch plugin`.
    pub pkg: String,
    /// Whether license terms must be accepted.
    pub license: bool,
}

/// Rows for every plugin in the index, in key order.
#[must_use]
pub fn plugin_rows(index: &PluginIndex) -> Vec<PluginRow> {
    index
        .keys()
        .filter_map(|key| {
            index.entry(key).map(|entry| PluginRow {
                name: entry.name.clone(),
                description: entry.description.clone(),
                pkg: key.to_owned(),
                license: index.license_for(key).is_some(),
            })
        })
        .collect()
}

/// Render the release menu, one numbered line per release.
///
/// # Examples
///
/// ```
/// use cagefetch::list_output::format_releases;
/// use cagefetch_common::menu_entries;
///
/// let releases = vec!["11.2-RELEASE".parse().unwrap()];
/// let menu = menu_entries(&releases, &releases);
/// assert_eq!(format_releases(&menu), "[0] 11.2-RELEASE (EOL)\n");
/// ```
#[must_use]
pub fn format_releases(menu: &[MenuEntry]) -> String {
    menu.iter().map(|entry| format!("{entry}\n")).collect()
}

/// Tab-separated rows for scripting: name, description, package, license.
#[must_use]
pub fn format_plain(rows: &[PluginRow]) -> String {
    rows.iter()
        .map(|row| {
            format!(
                "{}\t{}\t{}\t{}\n",
                row.name,
                row.description,
                row.pkg,
                if row.license { "yes" } else { "no" }
            )
        })
        .collect()
}

/// An aligned `NAME | DESCRIPTION | PKG` table.
///
/// Unless `long` is set, descriptions are shortened so that each line fits
/// [`TABLE_WIDTH`].
#[must_use]
pub fn format_table(rows: &[PluginRow], long: bool) -> String {
    let name_width = column_width("NAME", rows.iter().map(|row| row.name.as_str()));
    let pkg_width = column_width("PKG", rows.iter().map(|row| row.pkg.as_str()));
    let full_width = column_width("DESCRIPTION", rows.iter().map(|row| row.description.as_str()));
    let desc_width = if long {
        full_width
    } else {
        let fixed = name_width + pkg_width + " |  | ".len();
        full_width.min(TABLE_WIDTH.saturating_sub(fixed).max("DESCRIPTION".len()))
    };

    let mut out = table_line(
        ("NAME", name_width),
        ("DESCRIPTION", desc_width),
        ("PKG", pkg_width),
    );
    out.push_str(&format!(
        "{}-+-{}-+-{}\n",
        "-".repeat(name_width),
        "-".repeat(desc_width),
        "-".repeat(pkg_width)
    ));
    for row in rows {
        let description = shorten(&row.description, desc_width);
        out.push_str(&table_line(
            (&row.name, name_width),
            (&description, desc_width),
            (&row.pkg, pkg_width),
        ));
    }
    out
}

/// The rows as pretty JSON.
#[must_use]
pub fn format_json(rows: &[PluginRow]) -> String {
    serde_json::to_string_pretty(rows).unwrap_or_else(|_| "[]".to_owned())
}

fn column_width<'a>(heading: &str, cells: impl Iterator<Item = &'a str>) -> usize {
    cells
        .map(|cell| cell.chars().count())
        .chain(std::iter::once(heading.len()))
        .max()
        .unwrap_or_default()
}

fn table_line(name: (&str, usize), desc: (&str, usize), pkg: (&str, usize)) -> String {
    let line = format!(
        "{:<name_w$} | {:<desc_w$} | {:<pkg_w$}",
        name.0,
        desc.0,
        pkg.0,
        name_w = name.1,
        desc_w = desc.1,
        pkg_w = pkg.1
    );
    format!("{}\n", line.trim_end())
}

fn shorten(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_owned();
    }
    let keep = width.saturating_sub(ELLIPSIS.len());
    let mut short: String = text.chars().take(keep).collect();
    short.push_str(ELLIPSIS);
    short
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8Path;

    fn rows() -> Vec<PluginRow> {
        let index = PluginIndex::parse(
            Utf8Path::new("/iocage/.plugin_index"),
            r#"{
                "plexmediaserver": {
                    "name": "Plex Media Server",
                    "description": "Plex organizes all of your personal media so you can enjoy it no matter where you are"
                },
                "bru-server": {
                    "name": "BRU Server",
                    "description": "Backup and restore",
                    "license": "https://example.test/LICENSE"
                }
            }"#,
        )
        .expect("index");
        plugin_rows(&index)
    }

    #[test]
    fn plain_rows_are_tab_separated() {
        let output = format_plain(&rows());
        let first = output.lines().next().expect("first row");
        assert_eq!(first, "BRU Server\tBackup and restore\tbru-server\tyes");
    }

    #[test]
    fn short_table_fits_the_width() {
        let output = format_table(&rows(), false);
        assert!(output.starts_with("NAME"));
        assert!(output.lines().all(|line| line.chars().count() <= TABLE_WIDTH));
        assert!(output.contains(ELLIPSIS));
    }

    #[test]
    fn long_table_keeps_descriptions() {
        let output = format_table(&rows(), true);
        assert!(output.contains("no matter where you are"));
        assert!(!output.contains(ELLIPSIS));
    }

    #[test]
    fn json_lists_every_plugin() {
        let parsed: serde_json::Value =
            serde_json::from_str(&format_json(&rows())).expect("valid JSON");
        assert_eq!(parsed.as_array().map(Vec::len), Some(2));
    }
}
