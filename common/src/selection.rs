//! Resolving interactive menu answers into a concrete choice.

use crate::release::Release;
use thiserror::Error;

/// Outcome of a menu answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection<T> {
    /// The user picked an entry.
    Chosen(T),
    /// The user asked to leave without choosing.
    Exit,
}

/// Reasons a menu answer cannot be honoured.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    /// A numeric answer fell outside the menu.
    #[error("[{index}] is not in the list")]
    IndexOutOfRange {
        /// The rejected position.
        index: usize,
    },

    /// A release identifier was typed that the mirror does not offer.
    #[error("{value} is not in the list of available releases")]
    NotListed {
        /// The rejected identifier.
        value: String,
    },

    /// A plugin name matched nothing in the index.
    #[error("plugin {value} is not in the index")]
    UnknownPlugin {
        /// The rejected name fragment.
        value: String,
    },

    /// Nothing usable was entered and no default applies.
    #[error("please select an item")]
    NoSelection,
}

fn is_exit(answer: &str) -> bool {
    answer.eq_ignore_ascii_case("exit")
}

/// Resolve an answer to the release menu.
///
/// The answer may be `exit`, a zero-based index into `candidates`, or a
/// release identifier. An empty or unparsable answer falls back to `host`,
/// which must itself be listed unless it belongs to the hardened lineage.
///
/// # Errors
///
/// Returns [`SelectionError`] when the answer names nothing on the menu.
///
/// # Examples
///
/// ```
/// use cagefetch_common::release::Release;
/// use cagefetch_common::selection::{Selection, resolve_release};
///
/// let menu: Vec<Release> = vec!["10.4-RELEASE".parse().unwrap(), "11.2-RELEASE".parse().unwrap()];
/// let picked = resolve_release(&menu, "1", None).unwrap();
/// assert_eq!(picked, Selection::Chosen(menu[1].clone()));
/// ```
pub fn resolve_release(
    candidates: &[Release],
    answer: &str,
    host: Option<&Release>,
) -> Result<Selection<Release>, SelectionError> {
    let answer = answer.trim();
    if is_exit(answer) {
        return Ok(Selection::Exit);
    }

    if let Ok(index) = answer.parse::<usize>() {
        return candidates
            .get(index)
            .cloned()
            .map(Selection::Chosen)
            .ok_or(SelectionError::IndexOutOfRange { index });
    }

    if let Ok(release) = answer.parse::<Release>() {
        return if candidates.contains(&release) {
            Ok(Selection::Chosen(release))
        } else {
            Err(SelectionError::NotListed {
                value: release.to_string(),
            })
        };
    }

    match host {
        Some(host) if host.is_hardened() || candidates.contains(host) => {
            Ok(Selection::Chosen(host.clone()))
        }
        Some(host) => Err(SelectionError::NotListed {
            value: host.to_string(),
        }),
        None => Err(SelectionError::NoSelection),
    }
}

/// Resolve an answer to the plugin menu into a position in `labels`.
///
/// Short numeric answers select by index. Longer answers select the first
/// label containing the answer, ignoring case. An empty answer or `exit`
/// leaves the menu.
///
/// # Errors
///
/// Returns [`SelectionError`] when the answer matches no label.
pub fn resolve_plugin<S: AsRef<str>>(
    labels: &[S],
    answer: &str,
) -> Result<Selection<usize>, SelectionError> {
    let answer = answer.trim();
    if answer.is_empty() || is_exit(answer) {
        return Ok(Selection::Exit);
    }

    if let Ok(index) = answer.parse::<usize>() {
        return if index < labels.len() {
            Ok(Selection::Chosen(index))
        } else {
            Err(SelectionError::IndexOutOfRange { index })
        };
    }

    let needle = answer.to_lowercase();
    labels
        .iter()
        .position(|label| label.as_ref().to_lowercase().contains(&needle))
        .map(Selection::Chosen)
        .ok_or_else(|| SelectionError::UnknownPlugin {
            value: answer.to_owned(),
        })
}
